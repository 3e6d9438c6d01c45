//! Negotiated audio bus layout.
//!
//! Only the first audio bus in each direction is routed. Extra buses are
//! counted so callers can tell a plugin has them, but they stay inactive.

use serde::Serialize;

use crate::error::{HostError, HostResult, RangeError};
use crate::types::MAX_CHANNELS;

/// Bus and channel counts negotiated with a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BusLayout {
    /// Number of audio input buses.
    pub input_buses: usize,
    /// Number of audio output buses.
    pub output_buses: usize,
    /// Channels on input bus 0 (0 when there is no input bus).
    pub input_channels: usize,
    /// Channels on output bus 0 (0 when there is no output bus).
    pub output_channels: usize,
    /// Whether the plugin has an event input bus.
    pub has_event_input: bool,
}

impl BusLayout {
    /// Whether audio input is routed.
    #[inline]
    pub const fn has_audio_input(&self) -> bool {
        self.input_channels > 0
    }

    /// Whether audio output is routed.
    #[inline]
    pub const fn has_audio_output(&self) -> bool {
        self.output_channels > 0
    }

    /// Validate that the layout does not exceed system limits.
    pub fn validate(&self) -> HostResult<()> {
        if self.input_channels > MAX_CHANNELS {
            return Err(HostError::Init(format!(
                "input bus 0 declares {} channels, but MAX_CHANNELS is {}",
                self.input_channels, MAX_CHANNELS
            )));
        }
        if self.output_channels > MAX_CHANNELS {
            return Err(HostError::Init(format!(
                "output bus 0 declares {} channels, but MAX_CHANNELS is {}",
                self.output_channels, MAX_CHANNELS
            )));
        }
        Ok(())
    }

    /// Check caller-supplied channel counts against the layout.
    pub fn check_channels(&self, inputs: usize, outputs: usize) -> Result<(), RangeError> {
        RangeError::check(
            "input channels",
            inputs as i64,
            self.input_channels as i64 + 1,
        )?;
        RangeError::check(
            "output channels",
            outputs as i64,
            self.output_channels as i64 + 1,
        )
    }
}
