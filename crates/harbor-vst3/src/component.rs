//! Component and controller wiring.
//!
//! ```text
//! wire:      create component ─► initialize ─► query IAudioProcessor
//!                 │
//!                 ├─ controller class id? ─► create + initialize controller
//!                 │                          └─► connect both ways
//!                 └─ else: component as IEditController (single object)
//!            ─► install component handler
//!
//! shutdown:  controller.disconnect ─► component.disconnect
//!            ─► controller.terminate (separate only) ─► component.terminate
//! ```
//!
//! A connection failure is not fatal; the pair simply runs unconnected.

use harbor_core::{HostError, HostResult};
use log::{debug, info, warn};
use vst3::Steinberg::Vst::{
    IAudioProcessor, IComponent, IComponentTrait as _, IConnectionPoint,
    IConnectionPointTrait as _, IEditController, IEditControllerTrait as _,
};
use vst3::Steinberg::{kResultOk, IPluginBaseTrait as _, TUID};
use vst3::ComPtr;

use crate::host::HostContext;
use crate::module::{format_cid, ClassInfo, Module};

/// Connection points of a connected component/controller pair.
struct Connection {
    component: ComPtr<IConnectionPoint>,
    controller: ComPtr<IConnectionPoint>,
}

struct ControllerLink {
    controller: ComPtr<IEditController>,
    /// Created from its own class; terminated separately.
    separate: bool,
    connection: Option<Connection>,
}

/// The plugin objects behind one handle.
pub struct Wiring {
    component: ComPtr<IComponent>,
    processor: ComPtr<IAudioProcessor>,
    controller: Option<ControllerLink>,
    terminated: bool,
}

impl Wiring {
    /// Instantiate and wire `class` from `module`.
    ///
    /// On error every object created so far has been terminated and released.
    pub fn wire(module: &Module, class: &ClassInfo, host: &HostContext) -> HostResult<Self> {
        let context = host.unknown()?;
        let component = module.create_instance::<IComponent>(&class.cid)?;

        // SAFETY: Both pointers are valid for the call.
        let result = unsafe { component.initialize(context.as_ptr()) };
        if result != kResultOk {
            return Err(HostError::Init(format!(
                "component initialize rejected (result={result})"
            )));
        }

        let Some(processor) = component.cast::<IAudioProcessor>() else {
            // SAFETY: The component was initialized above.
            unsafe { component.terminate() };
            return Err(HostError::Init(
                "component does not implement IAudioProcessor".into(),
            ));
        };

        let mut wiring = Self {
            component,
            processor,
            controller: None,
            terminated: false,
        };
        // From here on, dropping `wiring` terminates what was created.
        wiring.controller = wiring.attach_controller(module, host)?;

        if let Some(link) = &wiring.controller {
            match host.component_handler() {
                // SAFETY: The handler outlives the controller via the host context.
                Some(handler) => unsafe {
                    link.controller.setComponentHandler(handler.as_ptr());
                },
                None => warn!("Host context has no component handler"),
            }
        }

        info!(
            "Wired \"{}\" ({})",
            class.name,
            match &wiring.controller {
                Some(ControllerLink { separate: true, .. }) => "separate controller",
                Some(_) => "single component",
                None => "no controller",
            }
        );
        Ok(wiring)
    }

    fn attach_controller(
        &self,
        module: &Module,
        host: &HostContext,
    ) -> HostResult<Option<ControllerLink>> {
        let mut cid: TUID = [0; 16];
        // SAFETY: `cid` is a valid out-parameter.
        let has_separate = unsafe { self.component.getControllerClassId(&mut cid) } == kResultOk;

        if has_separate {
            match module.create_instance::<IEditController>(&cid) {
                Ok(controller) => {
                    let context = host.unknown()?;
                    // SAFETY: Both pointers are valid for the call.
                    let result = unsafe { controller.initialize(context.as_ptr()) };
                    if result != kResultOk {
                        return Err(HostError::Init(format!(
                            "controller initialize rejected (result={result})"
                        )));
                    }
                    let connection = self.connect(&controller);
                    return Ok(Some(ControllerLink {
                        controller,
                        separate: true,
                        connection,
                    }));
                }
                Err(e) => warn!(
                    "Controller class {} could not be created ({e}), \
                     trying the component itself",
                    format_cid(&cid)
                ),
            }
        }

        Ok(self
            .component
            .cast::<IEditController>()
            .map(|controller| ControllerLink {
                controller,
                separate: false,
                connection: None,
            }))
    }

    /// Connect component and controller both ways. Any half-made connection
    /// is undone on failure.
    fn connect(&self, controller: &ComPtr<IEditController>) -> Option<Connection> {
        let (Some(component_cp), Some(controller_cp)) = (
            self.component.cast::<IConnectionPoint>(),
            controller.cast::<IConnectionPoint>(),
        ) else {
            warn!("Component or controller has no IConnectionPoint; running unconnected");
            return None;
        };

        // SAFETY: Both connection points are valid for the calls.
        unsafe {
            let result = component_cp.connect(controller_cp.as_ptr());
            if result != kResultOk {
                warn!("Component rejected connection (result={result}); running unconnected");
                return None;
            }
            let result = controller_cp.connect(component_cp.as_ptr());
            if result != kResultOk {
                warn!("Controller rejected connection (result={result}); running unconnected");
                component_cp.disconnect(controller_cp.as_ptr());
                return None;
            }
        }
        debug!("Connected component and controller");
        Some(Connection {
            component: component_cp,
            controller: controller_cp,
        })
    }

    pub fn component(&self) -> &ComPtr<IComponent> {
        &self.component
    }

    pub fn processor(&self) -> &ComPtr<IAudioProcessor> {
        &self.processor
    }

    pub fn controller(&self) -> Option<&ComPtr<IEditController>> {
        self.controller.as_ref().map(|link| &link.controller)
    }

    /// Whether the controller can talk to the component: a single-object
    /// plugin always can, a separate pair only once connected.
    pub fn controller_connected(&self) -> bool {
        match &self.controller {
            Some(link) => !link.separate || link.connection.is_some(),
            None => false,
        }
    }

    /// Disconnect and terminate. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        if let Some(link) = &mut self.controller {
            if let Some(connection) = link.connection.take() {
                // SAFETY: Both connection points are still valid.
                unsafe {
                    connection
                        .controller
                        .disconnect(connection.component.as_ptr());
                    connection
                        .component
                        .disconnect(connection.controller.as_ptr());
                }
            }
            if link.separate {
                // SAFETY: The controller was initialized during wiring.
                unsafe { link.controller.terminate() };
            }
        }
        // SAFETY: The component was initialized during wiring.
        unsafe { self.component.terminate() };
        debug!("Terminated plugin objects");
    }
}

impl Drop for Wiring {
    fn drop(&mut self) {
        self.shutdown();
    }
}
