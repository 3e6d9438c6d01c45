//! Parameter metadata reported by a hosted plugin.
//!
//! - [`ParameterDescriptor`] - one parameter as the controller describes it
//! - [`ParameterFlags`] - behavioral flags decoded from the controller's bit set

use serde::Serialize;

use crate::text::{FixedText, SHORT_TITLE_CAPACITY, TITLE_CAPACITY, UNITS_CAPACITY};
use crate::types::{ParameterId, ParameterValue};

/// Flags controlling parameter behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ParameterFlags {
    /// Parameter can be automated by the host.
    pub can_automate: bool,
    /// Parameter is read-only (display only).
    pub is_readonly: bool,
    /// Parameter wraps around at the ends of its range.
    pub is_wrap_around: bool,
    /// Parameter should be shown as a list of labels.
    pub is_list: bool,
    /// Parameter is hidden from parameter lists.
    pub is_hidden: bool,
    /// Parameter selects programs.
    pub is_program_change: bool,
    /// Parameter is the bypass switch.
    pub is_bypass: bool,
}

impl ParameterFlags {
    /// VST3 `kCanAutomate`.
    pub const CAN_AUTOMATE: i32 = 1 << 0;
    /// VST3 `kIsReadOnly`.
    pub const IS_READ_ONLY: i32 = 1 << 1;
    /// VST3 `kIsWrapAround`.
    pub const IS_WRAP_AROUND: i32 = 1 << 2;
    /// VST3 `kIsList`.
    pub const IS_LIST: i32 = 1 << 3;
    /// VST3 `kIsHidden`.
    pub const IS_HIDDEN: i32 = 1 << 4;
    /// VST3 `kIsProgramChange`.
    pub const IS_PROGRAM_CHANGE: i32 = 1 << 15;
    /// VST3 `kIsBypass`.
    pub const IS_BYPASS: i32 = 1 << 16;

    /// Decode a VST3 parameter flag set.
    pub const fn from_bits(bits: i32) -> Self {
        Self {
            can_automate: bits & Self::CAN_AUTOMATE != 0,
            is_readonly: bits & Self::IS_READ_ONLY != 0,
            is_wrap_around: bits & Self::IS_WRAP_AROUND != 0,
            is_list: bits & Self::IS_LIST != 0,
            is_hidden: bits & Self::IS_HIDDEN != 0,
            is_program_change: bits & Self::IS_PROGRAM_CHANGE != 0,
            is_bypass: bits & Self::IS_BYPASS != 0,
        }
    }
}

/// Metadata describing a single parameter.
///
/// Values are always normalized. A step count of 0 means continuous; N > 0
/// means N discrete divisions (N + 1 selectable values).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDescriptor {
    /// Parameter identifier.
    pub id: ParameterId,
    /// Full title (e.g. "Master Volume").
    pub title: FixedText<TITLE_CAPACITY>,
    /// Short title for constrained displays (e.g. "Vol").
    pub short_title: FixedText<SHORT_TITLE_CAPACITY>,
    /// Unit label (e.g. "dB").
    pub units: FixedText<UNITS_CAPACITY>,
    /// Default value.
    pub default_value: ParameterValue,
    /// Number of discrete steps, 0 for continuous.
    pub step_count: i32,
    /// Behavioral flags.
    pub flags: ParameterFlags,
}

impl ParameterDescriptor {
    /// Smallest normalized value.
    pub const MIN: ParameterValue = 0.0;
    /// Largest normalized value.
    pub const MAX: ParameterValue = 1.0;

    /// Whether the parameter is continuous.
    #[inline]
    pub const fn is_continuous(&self) -> bool {
        self.step_count <= 0
    }

    /// Distance between adjacent steps, `None` for continuous parameters.
    pub fn step_size(&self) -> Option<ParameterValue> {
        if self.is_continuous() {
            None
        } else {
            Some(1.0 / f64::from(self.step_count))
        }
    }

    /// Clamp `value` into range and snap it to the nearest step.
    pub fn quantize(&self, value: ParameterValue) -> ParameterValue {
        let clamped = value.clamp(Self::MIN, Self::MAX);
        if self.is_continuous() {
            return clamped;
        }
        let steps = f64::from(self.step_count);
        (clamped * steps).round() / steps
    }
}
