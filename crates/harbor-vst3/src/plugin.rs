//! The public handle to a hosted plugin.
//!
//! # Lifecycle
//!
//! ```text
//! PluginHandle::load ─► setup_processing ─► set_active(true) ─► process ...
//!        │                                  (process auto-activates)
//!        └──────────── drop / unload: deactivate ─► disconnect ─► terminate ─► unload module
//! ```
//!
//! The handle owns the module and every object created from it. Field order
//! matters: plugin objects are released before the module that holds their
//! code is unloaded.

use std::path::Path;

use harbor_core::{
    Activation, ActivationState, AudioBlock, BusLayout, Deactivation, EventQueue, FixedText,
    HostError, HostResult, Lifecycle, MidiEvent, ParameterDescriptor, ParameterFlags,
    ParameterId, ParameterQueue, PluginInfo, RangeError,
};
use log::{debug, info, warn};
use vst3::Steinberg::Vst::{
    IAudioProcessorTrait as _, IComponentTrait as _, IEditController,
    IEditControllerTrait as _, ParameterInfo,
};
use vst3::Steinberg::{kNotImplemented, kResultOk};
use vst3::ComPtr;

use crate::bus::negotiate;
use crate::component::Wiring;
use crate::host::HostContext;
use crate::module::{ClassInfo, Module};
use crate::session::{ProcessingSession, Queues};
use crate::util::text_from_wide;

/// A loaded, wired plugin.
pub struct PluginHandle {
    session: Option<ProcessingSession>,
    queues: Queues,
    wiring: Wiring,
    layout: BusLayout,
    lifecycle: Lifecycle,
    class: ClassInfo,
    host: HostContext,
    module: Module,
}

// SAFETY: The handle is driven by one thread at a time; it is not `Sync`.
// VST3 allows the host to move a plugin to its audio thread as long as calls
// are not concurrent, and nothing in the handle is tied to the creating
// thread.
unsafe impl Send for PluginHandle {}

impl PluginHandle {
    /// Load the plugin at `path` and wire its first audio module class.
    pub fn load(host: &HostContext, path: impl AsRef<Path>) -> HostResult<Self> {
        let module = Module::load(path)?;
        Self::from_module(host, module)
    }

    /// Wire the first audio module class of an already opened module.
    pub fn from_module(host: &HostContext, module: Module) -> HostResult<Self> {
        let class = module.audio_module_class()?;
        let wiring = Wiring::wire(&module, &class, host)?;
        let layout = negotiate(wiring.component())?;

        let parameters = wiring.controller().map_or(0, parameter_count);
        info!(
            "Loaded \"{}\": {} in / {} out, {parameters} parameters",
            class.name, layout.input_channels, layout.output_channels,
        );
        Ok(Self {
            session: None,
            queues: Queues::new(host.config(), parameters),
            wiring,
            layout,
            lifecycle: Lifecycle::new(),
            class,
            host: host.clone(),
            module,
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Identity and layout, read from the plugin now.
    pub fn info(&self) -> PluginInfo {
        let vendor = if self.class.vendor.is_empty() {
            self.module
                .factory_info()
                .map(|info| FixedText::from_str_truncated(info.vendor.as_str()))
                .unwrap_or_default()
        } else {
            FixedText::from_str_truncated(self.class.vendor.as_str())
        };
        PluginInfo {
            name: self.class.name,
            vendor,
            num_inputs: self.layout.input_channels,
            num_outputs: self.layout.output_channels,
            num_parameters: self.parameter_count(),
            sample_rate: self.session.as_ref().map_or(0.0, |s| s.sample_rate()),
        }
    }

    /// Factory class the handle was created from.
    pub fn class_info(&self) -> &ClassInfo {
        &self.class
    }

    /// Path of the plugin module, `None` for in-process factories.
    pub fn path(&self) -> Option<&Path> {
        self.module.path()
    }

    pub fn host(&self) -> &HostContext {
        &self.host
    }

    pub fn state(&self) -> ActivationState {
        self.lifecycle.state()
    }

    pub fn bus_layout(&self) -> BusLayout {
        self.layout
    }

    /// Whether component and controller can reach each other.
    pub fn controller_connected(&self) -> bool {
        self.wiring.controller_connected()
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    /// Number of parameters the controller exposes (0 without a controller).
    pub fn parameter_count(&self) -> usize {
        self.wiring.controller().map_or(0, parameter_count)
    }

    /// Describe the parameter at `index`.
    pub fn parameter_info(&self, index: usize) -> HostResult<ParameterDescriptor> {
        let count = self.parameter_count();
        if index >= count {
            return Err(HostError::NotFound(format!(
                "parameter index {index} (plugin has {count})"
            )));
        }
        let controller = self
            .wiring
            .controller()
            .ok_or_else(|| HostError::NotFound("plugin has no edit controller".into()))?;
        describe(controller, index)
    }

    /// Current normalized value of parameter `id`.
    pub fn parameter(&self, id: ParameterId) -> HostResult<f64> {
        let controller = find_parameter(self.wiring.controller(), id)
            .ok_or_else(|| HostError::NotFound(format!("parameter id {id}")))?;
        // SAFETY: Controller pointer is valid while the handle is alive.
        Ok(unsafe { controller.getParamNormalized(id) })
    }

    /// Set parameter `id` on the controller and queue it for the processor
    /// at the start of the next block.
    ///
    /// Nothing changes on either side unless both accept the value.
    pub fn set_parameter(&mut self, id: ParameterId, value: f64) -> HostResult<()> {
        check_value(id, value)?;
        let controller = self.known_parameter(id)?;
        self.queues.changes.admits(id, value, 0)?;
        // SAFETY: Controller pointer is valid while the handle is alive.
        let result = unsafe { controller.setParamNormalized(id, value) };
        if result != kResultOk {
            return Err(HostError::Parameter(format!(
                "plugin rejected value {value} for parameter {id} (result={result})"
            )));
        }
        self.queues.changes.push(id, value, 0)
    }

    /// Queue an automation point for parameter `id` in the next block.
    pub fn set_parameter_at(
        &mut self,
        id: ParameterId,
        value: f64,
        sample_offset: u32,
    ) -> HostResult<()> {
        check_value(id, value)?;
        self.known_parameter(id)?;
        self.queues.changes.push(id, value, sample_offset)
    }

    /// Stop re-sending queued parameter changes.
    pub fn clear_parameter_changes(&mut self) {
        self.queues.changes.clear();
    }

    pub fn pending_parameter_changes(&self) -> &ParameterQueue {
        &self.queues.changes
    }

    /// Parameter changes the plugin reported during the last block.
    pub fn output_parameter_changes(&self) -> &ParameterQueue {
        &self.queues.output_changes
    }

    fn known_parameter(&self, id: ParameterId) -> HostResult<&ComPtr<IEditController>> {
        find_parameter(self.wiring.controller(), id)
            .ok_or_else(|| HostError::Parameter(format!("unknown parameter id {id}")))
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Queue any event for the next block.
    pub fn send_event(&mut self, sample_offset: u32, event: MidiEvent) -> HostResult<()> {
        self.queues.events.push(sample_offset, event)
    }

    pub fn send_note_on(
        &mut self,
        channel: u8,
        note: u8,
        velocity: u8,
        sample_offset: u32,
    ) -> HostResult<()> {
        self.send_event(sample_offset, MidiEvent::note_on(channel, note, velocity)?)
    }

    pub fn send_note_off(&mut self, channel: u8, note: u8, sample_offset: u32) -> HostResult<()> {
        self.send_event(sample_offset, MidiEvent::note_off(channel, note)?)
    }

    pub fn send_control_change(
        &mut self,
        channel: u8,
        controller: u8,
        value: u8,
        sample_offset: u32,
    ) -> HostResult<()> {
        self.send_event(
            sample_offset,
            MidiEvent::control_change(channel, controller, value)?,
        )
    }

    /// Queue a program change. VST3 has no program change event, so it is
    /// sent as bank select MSB 0 followed by controller 32 carrying the
    /// program.
    pub fn send_program_change(
        &mut self,
        channel: u8,
        program: u8,
        sample_offset: u32,
    ) -> HostResult<()> {
        self.send_event(sample_offset, MidiEvent::program_change(channel, program)?)
    }

    pub fn pending_events(&self) -> &EventQueue {
        &self.queues.events
    }

    // =========================================================================
    // Setup and activation
    // =========================================================================

    /// Negotiate sample rate and maximum block size.
    ///
    /// Pending events are dropped, since their offsets refer to the old
    /// block size.
    pub fn setup_processing(&mut self, sample_rate: f64, max_block_size: usize) -> HostResult<()> {
        self.lifecycle.begin_setup()?;
        let session = ProcessingSession::setup(
            &self.wiring,
            &self.layout,
            self.host.config(),
            &self.queues,
            sample_rate,
            max_block_size,
        )?;
        self.session = Some(session);
        self.queues.set_block_size(max_block_size as u32);
        self.lifecycle.setup_done();
        Ok(())
    }

    /// Start or stop processing.
    pub fn set_active(&mut self, active: bool) -> HostResult<()> {
        if active {
            match self.lifecycle.begin_activate()? {
                Activation::AlreadyActive => Ok(()),
                Activation::Start => self.start(),
            }
        } else {
            match self.lifecycle.begin_deactivate()? {
                Deactivation::Stop => self.stop(),
                Deactivation::NotRunning => self.lifecycle.deactivate_done(),
            }
            Ok(())
        }
    }

    fn start(&mut self) -> HostResult<()> {
        let component = self.wiring.component();
        // SAFETY: Component pointer is valid while the handle is alive.
        let result = unsafe { component.setActive(1) };
        if result != kResultOk {
            return Err(HostError::Activation(format!(
                "plugin rejected setActive(true) (result={result})"
            )));
        }

        // SAFETY: Processor pointer is valid while the handle is alive.
        let result = unsafe { self.wiring.processor().setProcessing(1) };
        if result != kResultOk && result != kNotImplemented {
            // SAFETY: Component pointer is valid while the handle is alive.
            unsafe { component.setActive(0) };
            return Err(HostError::Activation(format!(
                "plugin rejected setProcessing(true) (result={result})"
            )));
        }

        self.lifecycle.activate_done();
        debug!("Plugin activated");
        Ok(())
    }

    fn stop(&mut self) {
        // SAFETY: Processor pointer is valid while the handle is alive.
        let result = unsafe { self.wiring.processor().setProcessing(0) };
        if result != kResultOk && result != kNotImplemented {
            warn!("setProcessing(false) failed (result={result})");
        }
        // SAFETY: Component pointer is valid while the handle is alive.
        let result = unsafe { self.wiring.component().setActive(0) };
        if result != kResultOk {
            warn!("setActive(false) failed (result={result})");
        }
        self.lifecycle.deactivate_done();
        debug!("Plugin deactivated");
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// Process one block of `num_samples` frames.
    ///
    /// Supply at most the negotiated number of channels in each direction;
    /// missing input channels are silent and missing output channels are
    /// discarded. Starts the plugin first if it is configured but not
    /// running.
    pub fn process(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        num_samples: usize,
    ) -> HostResult<()> {
        let start = self.check_block(inputs.len(), outputs.len(), num_samples)?;
        check_lengths(
            "input channel length",
            inputs.iter().map(|channel| channel.len()),
            num_samples,
        )?;
        check_lengths(
            "output channel length",
            outputs.iter().map(|channel| channel.len()),
            num_samples,
        )?;
        self.ensure_running(start)?;
        let Self {
            session,
            queues,
            wiring,
            ..
        } = self;
        let session = session
            .as_mut()
            .ok_or_else(|| HostError::Setup("processing has not been configured".into()))?;
        session.process(
            wiring,
            inputs.iter().copied(),
            outputs.iter_mut().map(|channel| &mut **channel),
            num_samples,
            queues,
        )
    }

    /// Process `input` into `output`. The block length is `output.frames()`;
    /// a non-empty `input` must have the same length.
    pub fn process_block(&mut self, input: &AudioBlock, output: &mut AudioBlock) -> HostResult<()> {
        let num_samples = output.frames();
        if input.channels() > 0 && input.frames() != num_samples {
            return Err(RangeError::new(
                "input frames",
                input.frames() as i64,
                num_samples as i64,
            )
            .into());
        }
        let start = self.check_block(input.channels(), output.channels(), num_samples)?;
        self.ensure_running(start)?;
        let Self {
            session,
            queues,
            wiring,
            ..
        } = self;
        let session = session
            .as_mut()
            .ok_or_else(|| HostError::Setup("processing has not been configured".into()))?;
        session.process(
            wiring,
            input.iter_channels(),
            output.iter_channels_mut(),
            num_samples,
            queues,
        )
    }

    /// Validate a block's channel and sample counts.
    fn check_block(
        &self,
        inputs: usize,
        outputs: usize,
        num_samples: usize,
    ) -> HostResult<Activation> {
        let start = self.lifecycle.begin_process()?;
        self.layout.check_channels(inputs, outputs)?;
        if let Some(session) = &self.session {
            RangeError::check(
                "sample count",
                num_samples as i64,
                session.max_block_size() as i64 + 1,
            )?;
        }
        Ok(start)
    }

    /// Start the plugin if the block needs it. Runs only once the whole
    /// block has been validated.
    fn ensure_running(&mut self, start: Activation) -> HostResult<()> {
        if start == Activation::Start {
            self.start()
                .map_err(|e| HostError::Process(format!("automatic activation failed: {e}")))?;
        }
        Ok(())
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Deactivate, terminate and unload. Equivalent to dropping the handle.
    pub fn unload(self) {
        drop(self);
    }

    fn teardown(&mut self) {
        if self.lifecycle.state() == ActivationState::Unloaded {
            return;
        }
        if self.lifecycle.state() == ActivationState::Active {
            self.stop();
        }
        self.session = None;
        self.wiring.shutdown();
        let prior = self.lifecycle.unload();
        info!("Unloaded \"{}\" (was {prior:?})", self.class.name);
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.class.name.as_str())
            .field("state", &self.lifecycle.state())
            .field("layout", &self.layout)
            .finish()
    }
}

// =============================================================================
// Parameter helpers
// =============================================================================

fn parameter_count(controller: &ComPtr<IEditController>) -> usize {
    // SAFETY: Controller pointer is valid while its handle is alive.
    unsafe { controller.getParameterCount() }.max(0) as usize
}

fn describe(controller: &ComPtr<IEditController>, index: usize) -> HostResult<ParameterDescriptor> {
    // SAFETY: ParameterInfo is plain C data; all-zero is a valid value.
    let mut info: ParameterInfo = unsafe { std::mem::zeroed() };
    // SAFETY: `info` is a valid out-parameter for the duration of the call.
    let result = unsafe { controller.getParameterInfo(index as i32, &mut info) };
    if result != kResultOk {
        return Err(HostError::NotFound(format!(
            "parameter index {index} (result={result})"
        )));
    }
    Ok(ParameterDescriptor {
        id: info.id,
        title: text_from_wide(&info.title),
        short_title: text_from_wide(&info.shortTitle),
        units: text_from_wide(&info.units),
        default_value: info.defaultNormalizedValue.clamp(0.0, 1.0),
        step_count: info.stepCount.max(0),
        flags: ParameterFlags::from_bits(info.flags),
    })
}

/// `controller`, if it exposes parameter `id`.
fn find_parameter(
    controller: Option<&ComPtr<IEditController>>,
    id: ParameterId,
) -> Option<&ComPtr<IEditController>> {
    controller.filter(|controller| {
        (0..parameter_count(controller)).any(|index| {
            describe(controller, index).is_ok_and(|parameter| parameter.id == id)
        })
    })
}

/// Every supplied channel must hold at least `num_samples` samples.
fn check_lengths(
    field: &'static str,
    lengths: impl IntoIterator<Item = usize>,
    num_samples: usize,
) -> Result<(), RangeError> {
    match lengths.into_iter().find(|&len| len < num_samples) {
        Some(len) => Err(RangeError::new(field, len as i64, num_samples as i64)),
        None => Ok(()),
    }
}

fn check_value(id: ParameterId, value: f64) -> HostResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(HostError::Parameter(format!(
            "value {value} for parameter {id} is outside 0.0..=1.0"
        )))
    }
}
