//! Host-side COM objects shared by every loaded plugin.
//!
//! [`HostContext`] is created once and passed to every load. Plugins receive
//! its `IHostApplication` during `initialize` and its `IComponentHandler` once
//! their controller is wired up. Both objects are immutable, so one context
//! can serve any number of plugins.

use std::ffi::c_void;
use std::sync::Arc;

use harbor_core::{HostConfig, HostError, HostResult};
use log::debug;
use vst3::Steinberg::Vst::{
    IComponentHandler, IComponentHandlerTrait, IHostApplication, IHostApplicationTrait, ParamID,
    ParamValue, String128,
};
use vst3::Steinberg::{kInvalidArgument, kNotImplemented, kResultOk, int32, tresult, FUnknown, TUID};
use vst3::{Class, ComPtr, ComWrapper};

use crate::util::copy_wstring;

// =============================================================================
// IHostApplication
// =============================================================================

struct HostApplication {
    name: String,
}

impl Class for HostApplication {
    type Interfaces = (IHostApplication,);
}

impl IHostApplicationTrait for HostApplication {
    unsafe fn getName(&self, name: *mut String128) -> tresult {
        if name.is_null() {
            return kInvalidArgument;
        }
        // SAFETY: Validated name is non-null above. Plugin guarantees it points
        // to a writable String128.
        copy_wstring(&self.name, unsafe { &mut *name });
        kResultOk
    }

    unsafe fn createInstance(
        &self,
        _cid: *mut TUID,
        _iid: *mut TUID,
        _obj: *mut *mut c_void,
    ) -> tresult {
        kNotImplemented
    }
}

// =============================================================================
// IComponentHandler
// =============================================================================

/// Receives edits the plugin's own UI makes. Harbor has no UI of its own, so
/// edits are acknowledged and logged.
struct ComponentHandler;

impl Class for ComponentHandler {
    type Interfaces = (IComponentHandler,);
}

impl IComponentHandlerTrait for ComponentHandler {
    unsafe fn beginEdit(&self, id: ParamID) -> tresult {
        debug!("Plugin began editing parameter {id}");
        kResultOk
    }

    unsafe fn performEdit(&self, id: ParamID, value_normalized: ParamValue) -> tresult {
        debug!("Plugin edited parameter {id} to {value_normalized}");
        kResultOk
    }

    unsafe fn endEdit(&self, id: ParamID) -> tresult {
        debug!("Plugin ended editing parameter {id}");
        kResultOk
    }

    unsafe fn restartComponent(&self, flags: int32) -> tresult {
        debug!("Plugin requested restart (flags={flags:#x}), ignored");
        kResultOk
    }
}

// =============================================================================
// HostContext
// =============================================================================

struct HostInner {
    config: HostConfig,
    application: ComWrapper<HostApplication>,
    handler: ComWrapper<ComponentHandler>,
}

/// Host identity and configuration handed to every plugin.
///
/// Cheap to clone; clones share the same COM objects.
#[derive(Clone)]
pub struct HostContext {
    inner: Arc<HostInner>,
}

impl HostContext {
    /// Create a context. Fails if `config` does not validate.
    pub fn new(config: HostConfig) -> HostResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: HostConfig) -> Self {
        let application = ComWrapper::new(HostApplication {
            name: config.host_name.to_string(),
        });
        Self {
            inner: Arc::new(HostInner {
                config,
                application,
                handler: ComWrapper::new(ComponentHandler),
            }),
        }
    }

    /// Configuration shared by every plugin loaded with this context.
    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    /// The `FUnknown` passed to `IPluginBase::initialize`.
    pub(crate) fn unknown(&self) -> HostResult<ComPtr<FUnknown>> {
        self.inner
            .application
            .to_com_ptr::<FUnknown>()
            .ok_or_else(|| HostError::Init("host application has no FUnknown".into()))
    }

    /// The handler installed on every edit controller.
    pub(crate) fn component_handler(&self) -> Option<ComPtr<IComponentHandler>> {
        self.inner.handler.to_com_ptr::<IComponentHandler>()
    }
}

impl Default for HostContext {
    fn default() -> Self {
        Self::build(HostConfig::new())
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("config", &self.inner.config)
            .finish()
    }
}
