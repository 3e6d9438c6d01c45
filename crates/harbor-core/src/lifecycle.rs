//! Activation state machine.
//!
//! Every state-changing operation on a plugin handle asks [`Lifecycle`] what
//! to do first, performs the plugin calls it is told to perform, then commits
//! the new state. A rejected operation never changes state.
//!
//! ```text
//!  Loaded ──setup──► Configured ──activate──► Active
//!                        ▲                    │  ▲
//!                        │ setup   deactivate │  │ activate / process
//!                        │                    ▼  │
//!                        └────────────────── Inactive
//!
//!  any state ──unload──► Unloaded
//! ```

use serde::Serialize;

use crate::error::{HostError, HostResult};

/// Where a plugin handle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivationState {
    /// Torn down; no plugin objects remain.
    Unloaded,
    /// Loaded and wired, processing not configured.
    Loaded,
    /// Processing configured, not running.
    Configured,
    /// Running.
    Active,
    /// Configured and stopped after having run.
    Inactive,
}

/// What an activation request requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The plugin must be started.
    Start,
    /// Already running; nothing to do.
    AlreadyActive,
}

/// What a deactivation request requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deactivation {
    /// The plugin must be stopped.
    Stop,
    /// Not running; only the recorded state changes.
    NotRunning,
}

/// Legal call sequencing for one plugin handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    state: ActivationState,
}

impl Lifecycle {
    /// Lifecycle of a freshly loaded plugin.
    pub const fn new() -> Self {
        Self {
            state: ActivationState::Loaded,
        }
    }

    /// Current state.
    #[inline]
    pub const fn state(&self) -> ActivationState {
        self.state
    }

    /// Whether processing has been configured at least once.
    pub const fn is_configured(&self) -> bool {
        matches!(
            self.state,
            ActivationState::Configured | ActivationState::Active | ActivationState::Inactive
        )
    }

    // =====================================================================
    // Setup
    // =====================================================================

    /// Check that processing may be (re)configured.
    pub fn begin_setup(&self) -> HostResult<()> {
        match self.state {
            ActivationState::Loaded | ActivationState::Configured | ActivationState::Inactive => {
                Ok(())
            }
            ActivationState::Active => Err(HostError::Setup(
                "cannot reconfigure an active plugin; deactivate it first".into(),
            )),
            ActivationState::Unloaded => Err(HostError::Setup("plugin is unloaded".into())),
        }
    }

    /// Record a successful setup.
    pub fn setup_done(&mut self) {
        self.state = ActivationState::Configured;
    }

    // =====================================================================
    // Activation
    // =====================================================================

    /// Decide what an activation request requires.
    pub fn begin_activate(&self) -> HostResult<Activation> {
        match self.state {
            ActivationState::Configured | ActivationState::Inactive => Ok(Activation::Start),
            ActivationState::Active => Ok(Activation::AlreadyActive),
            ActivationState::Loaded => Err(HostError::Activation(
                "processing has not been configured".into(),
            )),
            ActivationState::Unloaded => {
                Err(HostError::Activation("plugin is unloaded".into()))
            }
        }
    }

    /// Record a successful activation.
    pub fn activate_done(&mut self) {
        self.state = ActivationState::Active;
    }

    /// Decide what a deactivation request requires.
    pub fn begin_deactivate(&self) -> HostResult<Deactivation> {
        match self.state {
            ActivationState::Active => Ok(Deactivation::Stop),
            ActivationState::Configured | ActivationState::Inactive => {
                Ok(Deactivation::NotRunning)
            }
            ActivationState::Loaded => Err(HostError::Activation(
                "processing has not been configured".into(),
            )),
            ActivationState::Unloaded => {
                Err(HostError::Activation("plugin is unloaded".into()))
            }
        }
    }

    /// Record a deactivation. Always lands in `Inactive`, even when the
    /// plugin complained while stopping.
    pub fn deactivate_done(&mut self) {
        self.state = ActivationState::Inactive;
    }

    // =====================================================================
    // Processing
    // =====================================================================

    /// Decide whether a process call may run and whether it must start the
    /// plugin first.
    pub fn begin_process(&self) -> HostResult<Activation> {
        match self.state {
            ActivationState::Active => Ok(Activation::AlreadyActive),
            ActivationState::Configured | ActivationState::Inactive => Ok(Activation::Start),
            ActivationState::Loaded => Err(HostError::Setup(
                "processing has not been configured; call setup_processing first".into(),
            )),
            ActivationState::Unloaded => Err(HostError::Process("plugin is unloaded".into())),
        }
    }

    // =====================================================================
    // Unload
    // =====================================================================

    /// Record teardown, returning the state the plugin was in.
    pub fn unload(&mut self) -> ActivationState {
        std::mem::replace(&mut self.state, ActivationState::Unloaded)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
