//! # harbor-core
//!
//! Format-agnostic building blocks for hosting audio plugins.
//!
//! Nothing in this crate talks to a plugin binary. It holds the pieces a
//! format layer (see `harbor-vst3`) drives while it does:
//!
//! - [`HostConfig`] - host identity and queue capacities
//! - [`Lifecycle`] - the activation state machine
//! - [`EventQueue`] / [`ParameterQueue`] - per-block input staging
//! - [`ProcessBuffers`] - allocation-free channel binding
//! - [`BusLayout`], [`PluginInfo`], [`ParameterDescriptor`] - what a plugin reports
//!
//! ## Architecture
//!
//! ```text
//! caller (harbor::PluginHandle)
//!        ↓
//! harbor-vst3 (COM calls, module loading)
//!        ↓
//! harbor-core (state, queues, buffers, errors)
//! ```

pub mod audio_block;
pub mod buffer_storage;
pub mod bus_layout;
pub mod config;
pub mod error;
pub mod event_queue;
pub mod lifecycle;
pub mod midi;
pub mod parameter_info;
pub mod parameter_queue;
pub mod plugin_info;
pub mod text;
pub mod types;

pub use audio_block::AudioBlock;
pub use buffer_storage::ProcessBuffers;
pub use bus_layout::BusLayout;
pub use config::{HostConfig, ProcessMode};
pub use error::{HostError, HostResult, RangeError};
pub use event_queue::EventQueue;
pub use lifecycle::{Activation, ActivationState, Deactivation, Lifecycle};
pub use midi::{MidiEvent, TimedEvent};
pub use parameter_info::{ParameterDescriptor, ParameterFlags};
pub use parameter_queue::{ParameterPoint, ParameterQueue};
pub use plugin_info::PluginInfo;
pub use text::FixedText;
pub use types::{ParameterId, ParameterValue, MAX_BLOCK_SIZE, MAX_CHANNELS};
