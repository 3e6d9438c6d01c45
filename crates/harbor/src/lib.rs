//! # Harbor
//!
//! Host VST3 audio plugins from Rust.
//!
//! Harbor loads a plugin module, wires its component and controller,
//! negotiates buses and processing setup, and runs blocks of audio, MIDI
//! events and parameter automation through it.
//!
//! ## Architecture
//!
//! ```text
//! Your host
//!        ↓
//! PluginHandle (harbor-vst3)
//!        ↓
//! VST3 COM interfaces (IComponent, IAudioProcessor, IEditController)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use harbor::prelude::*;
//!
//! let host = HostContext::new(HostConfig::new().with_host_name("My Host"))?;
//! let mut synth = PluginHandle::load(&host, "/Library/Audio/Plug-Ins/VST3/Synth.vst3")?;
//! synth.setup_processing(44_100.0, 512)?;
//!
//! synth.send_note_on(0, 60, 100, 0)?;
//! let mut out = AudioBlock::new(synth.info().num_outputs, 512);
//! synth.process_block(&AudioBlock::new(0, 512), &mut out)?;
//! ```

// Re-export sub-crates
pub use harbor_core as core;

#[cfg(feature = "vst3")]
pub use harbor_vst3 as vst3_impl;

#[cfg(feature = "vst3")]
pub use harbor_vst3::{HostContext, Module, PluginHandle};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use harbor::prelude::*;
/// ```
pub mod prelude {
    pub use harbor_core::{
        // Lifecycle
        ActivationState,
        // Buffers
        AudioBlock,
        // Layout and metadata
        BusLayout, ParameterDescriptor, ParameterFlags, PluginInfo,
        // Configuration
        HostConfig, ProcessMode,
        // Errors
        HostError, HostResult, RangeError,
        // Events and automation
        EventQueue, MidiEvent, ParameterId, ParameterQueue, TimedEvent,
    };

    #[cfg(feature = "vst3")]
    pub use harbor_vst3::{ClassInfo, HostContext, Module, PluginHandle};
}
