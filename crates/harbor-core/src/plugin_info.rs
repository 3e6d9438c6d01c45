//! Snapshot of a loaded plugin's identity and layout.

use serde::Serialize;

use crate::text::{FixedText, NAME_CAPACITY};

/// Identity and layout of a loaded plugin.
///
/// Built on demand from the live component and controller; never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginInfo {
    /// Class name reported by the factory.
    pub name: FixedText<NAME_CAPACITY>,
    /// Class vendor, or the factory vendor when the class reports none.
    pub vendor: FixedText<NAME_CAPACITY>,
    /// Channels on the first audio input bus.
    pub num_inputs: usize,
    /// Channels on the first audio output bus.
    pub num_outputs: usize,
    /// Parameters exposed by the controller (0 without a controller).
    pub num_parameters: usize,
    /// Configured sample rate, 0 before setup.
    pub sample_rate: f64,
}

impl PluginInfo {
    /// Whether the plugin takes no audio input (instruments, generators).
    pub const fn is_instrument(&self) -> bool {
        self.num_inputs == 0
    }

    /// Pretty-printed JSON for display collaborators.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
