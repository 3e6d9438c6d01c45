//! Host configuration.
//!
//! [`HostConfig`] carries the settings shared by every plugin a host loads:
//! the name reported to plugins, queue capacities for the real-time path, the
//! processing mode and the tempo written into the process context.
//!
//! # Example
//!
//! ```ignore
//! use harbor_core::HostConfig;
//!
//! const CONFIG: HostConfig = HostConfig::new()
//!     .with_event_capacity(1024)
//!     .with_tempo(96.0);
//!
//! let from_file = HostConfig::from_json(r#"{ "host_name": "render-farm" }"#)?;
//! ```

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::{HostError, HostResult};

/// Default name reported through the host application interface.
pub const DEFAULT_HOST_NAME: &str = "Harbor";
/// Default number of events admitted per block.
pub const DEFAULT_EVENT_CAPACITY: usize = 512;
/// Default number of distinct parameters changed per block.
pub const DEFAULT_PARAMETER_QUEUE_CAPACITY: usize = 64;
/// Default number of automation points per parameter per block.
pub const DEFAULT_POINTS_PER_PARAMETER: usize = 16;
/// Default transport tempo in beats per minute.
pub const DEFAULT_TEMPO: f64 = 120.0;

// =========================================================================
// ProcessMode
// =========================================================================

/// Processing mode announced to the plugin at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessMode {
    /// Live playback; the plugin must keep up with the audio clock.
    #[default]
    Realtime,
    /// Ahead-of-time rendering that may run faster than real time.
    Prefetch,
    /// Offline bounce; the plugin may use expensive algorithms.
    Offline,
}

impl ProcessMode {
    /// Numeric value used by the VST3 process setup.
    pub const fn as_vst3(self) -> i32 {
        match self {
            Self::Realtime => 0,
            Self::Prefetch => 1,
            Self::Offline => 2,
        }
    }
}

// =========================================================================
// HostConfig
// =========================================================================

/// Settings shared by every plugin a host loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Name reported to plugins.
    pub host_name: Cow<'static, str>,
    /// Maximum number of events queued for one block.
    pub event_capacity: usize,
    /// Maximum number of distinct parameters changed in one block.
    pub parameter_queue_capacity: usize,
    /// Maximum number of automation points per parameter in one block.
    pub points_per_parameter: usize,
    /// Processing mode announced at setup.
    pub process_mode: ProcessMode,
    /// Tempo written into the process context.
    pub tempo: f64,
}

impl HostConfig {
    /// Configuration with default values.
    pub const fn new() -> Self {
        Self {
            host_name: Cow::Borrowed(DEFAULT_HOST_NAME),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            parameter_queue_capacity: DEFAULT_PARAMETER_QUEUE_CAPACITY,
            points_per_parameter: DEFAULT_POINTS_PER_PARAMETER,
            process_mode: ProcessMode::Realtime,
            tempo: DEFAULT_TEMPO,
        }
    }

    /// Set the name reported to plugins.
    pub fn with_host_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.host_name = name.into();
        self
    }

    /// Set the number of events admitted per block.
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set how many distinct parameters may change per block.
    pub const fn with_parameter_queue_capacity(mut self, capacity: usize) -> Self {
        self.parameter_queue_capacity = capacity;
        self
    }

    /// Set how many automation points each parameter may carry per block.
    pub const fn with_points_per_parameter(mut self, points: usize) -> Self {
        self.points_per_parameter = points;
        self
    }

    /// Set the processing mode.
    pub const fn with_process_mode(mut self, mode: ProcessMode) -> Self {
        self.process_mode = mode;
        self
    }

    /// Set the transport tempo.
    pub const fn with_tempo(mut self, bpm: f64) -> Self {
        self.tempo = bpm;
        self
    }

    /// Parse a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> HostResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| HostError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every capacity is usable.
    pub fn validate(&self) -> HostResult<()> {
        if self.event_capacity < 2 {
            // A program change expands to two events.
            return Err(HostError::Config(format!(
                "event_capacity must be at least 2, got {}",
                self.event_capacity
            )));
        }
        if self.parameter_queue_capacity == 0 || self.points_per_parameter == 0 {
            return Err(HostError::Config(
                "parameter queue capacities must be non-zero".into(),
            ));
        }
        if !self.tempo.is_finite() || self.tempo <= 0.0 {
            return Err(HostError::Config(format!(
                "tempo must be positive, got {}",
                self.tempo
            )));
        }
        Ok(())
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new()
    }
}
