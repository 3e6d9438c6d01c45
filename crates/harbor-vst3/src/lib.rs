//! # harbor-vst3
//!
//! VST3 hosting layer for Harbor.
//!
//! This crate loads VST3 modules and drives the plugins inside them through
//! their COM interfaces:
//!
//! - Module loading and factory enumeration ([`Module`])
//! - Component/controller wiring and teardown
//! - Host-side `IEventList` / `IParameterChanges` implementations
//! - The public [`PluginHandle`]
//!
//! ## Architecture
//!
//! ```text
//! PluginHandle (lifecycle, queues, public API)
//!        ↓
//! Wiring + ProcessingSession (COM calls, ProcessData)
//!        ↓
//! Module (libloading, IPluginFactory)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use harbor_vst3::{HostContext, PluginHandle};
//!
//! let host = HostContext::default();
//! let mut plugin = PluginHandle::load(&host, "/path/to/Gain.vst3")?;
//! plugin.setup_processing(48_000.0, 512)?;
//! plugin.process(&[&left, &right], &mut [&mut out_l, &mut out_r], 512)?;
//! ```

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

pub mod bus;
pub mod component;
pub mod event_list;
pub mod host;
pub mod module;
pub mod plugin;
pub mod session;
pub mod util;

#[cfg(test)]
pub(crate) mod mock;

// Re-exports
pub use host::HostContext;
pub use module::{ClassInfo, FactoryInfo, Module};
pub use plugin::PluginHandle;
pub use session::Queues;

// Re-export vst3 crate for callers that need raw interface types
pub use vst3;
