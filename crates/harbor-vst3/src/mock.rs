//! In-process VST3 plugin and factory for tests.
//!
//! [`module`] builds a [`Module`] around a [`MockFactory`] whose classes are
//! implemented by [`MockPlugin`]. Every observable call lands in a shared
//! [`MockProbe`] so tests can assert on what the host did.
//!
//! The same plugin type serves both classes. As the processing component it
//! applies a fixed gain (or, without audio input, emits a constant while a
//! note is held); as the controller it serves the parameter table below.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::rc::Rc;

use vst3::Steinberg::Vst::ProcessContext_::StatesAndFlags_::kTempoValid;
use vst3::Steinberg::Vst::*;
use vst3::Steinberg::*;
use vst3::{Class, ComRef, ComWrapper};

use crate::module::{Module, AUDIO_MODULE_CLASS, COMPONENT_CONTROLLER_CLASS};
use crate::util::{copy_cstring, copy_wstring};

pub const COMPONENT_CID: TUID = [0x11; 16];
pub const CONTROLLER_CID: TUID = [0x22; 16];
pub const VENDOR: &str = "Harbor Test Audio";

pub const GAIN_ID: ParamID = 10;
pub const MODE_ID: ParamID = 42;

/// Value an instrument writes to every output sample while a note is on.
pub const NOTE_LEVEL: f32 = 0.5;

struct MockParameter {
    id: ParamID,
    title: &'static str,
    short_title: &'static str,
    units: &'static str,
    default: f64,
    steps: i32,
    flags: i32,
}

const PARAMETERS: [MockParameter; 2] = [
    MockParameter {
        id: GAIN_ID,
        title: "Output Gain",
        short_title: "Gain",
        units: "dB",
        default: 0.5,
        steps: 0,
        flags: 1,
    },
    MockParameter {
        id: MODE_ID,
        title: "Mode",
        short_title: "Mode",
        units: "",
        default: 0.0,
        steps: 2,
        flags: 1 | (1 << 3),
    },
];

/// Number of parameters the mock controller exposes.
pub const PARAMETER_COUNT: usize = PARAMETERS.len();

// =============================================================================
// Spec and probe
// =============================================================================

/// Behavior switches for one mock factory.
#[derive(Debug, Clone)]
pub struct MockSpec {
    pub inputs: i32,
    pub outputs: i32,
    pub event_input: bool,
    pub separate_controller: bool,
    pub fail_controller_create: bool,
    pub reject_initialize: bool,
    pub reject_controller_initialize: bool,
    pub reject_setup: bool,
    pub reject_set_active: bool,
    pub set_processing_result: tresult,
    pub reject_process: bool,
    pub reject_connect: bool,
    pub fail_bus_info: bool,
    pub gain: f32,
}

impl MockSpec {
    /// Stereo effect, combined component and controller.
    pub fn effect() -> Self {
        Self {
            inputs: 2,
            outputs: 2,
            event_input: false,
            separate_controller: false,
            fail_controller_create: false,
            reject_initialize: false,
            reject_controller_initialize: false,
            reject_setup: false,
            reject_set_active: false,
            set_processing_result: kResultOk,
            reject_process: false,
            reject_connect: false,
            fail_bus_info: false,
            gain: 0.5,
        }
    }

    /// Stereo instrument with an event input and a separate controller.
    pub fn instrument() -> Self {
        Self {
            inputs: 0,
            event_input: true,
            separate_controller: true,
            ..Self::effect()
        }
    }
}

/// Everything the mock observed.
#[derive(Default)]
pub struct MockProbe {
    pub live: Cell<i32>,
    pub initialized: Cell<u32>,
    pub terminated: Cell<u32>,
    pub connects: Cell<u32>,
    pub disconnects: Cell<u32>,
    pub active: Cell<bool>,
    pub processing: Cell<bool>,
    pub process_calls: Cell<u32>,
    pub last_frames: Cell<i32>,
    /// `(sample rate, max block size, process mode, sample size)`
    pub setup: Cell<Option<(f64, i32, i32, i32)>>,
    /// `(sample rate, tempo, project time in samples)`
    pub last_context: Cell<Option<(f64, f64, i64)>>,
    pub last_events: RefCell<Vec<Event>>,
    /// `(id, sample offset, value)` in delivery order.
    pub last_points: RefCell<Vec<(ParamID, i32, f64)>>,
    pub handler_installed: Cell<bool>,
    activated: RefCell<Vec<(i32, i32)>>,
    values: RefCell<Vec<(ParamID, f64)>>,
    calls: RefCell<Vec<&'static str>>,
}

impl MockProbe {
    fn new() -> Self {
        let probe = Self::default();
        *probe.values.borrow_mut() = PARAMETERS.iter().map(|p| (p.id, p.default)).collect();
        probe
    }

    /// `(media type, direction)` of every `activateBus` call.
    pub fn activated_buses(&self) -> Vec<(i32, i32)> {
        self.activated.borrow().clone()
    }

    /// Lifecycle calls in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Current value of a parameter.
    pub fn value(&self, id: ParamID) -> Option<f64> {
        self.values
            .borrow()
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|&(_, v)| v)
    }

    fn set_value(&self, id: ParamID, value: f64) -> bool {
        match self.values.borrow_mut().iter_mut().find(|(pid, _)| *pid == id) {
            Some(slot) => {
                slot.1 = value;
                true
            }
            None => false,
        }
    }

    fn record(&self, call: &'static str) {
        self.calls.borrow_mut().push(call);
    }

    fn bump(cell: &Cell<u32>) {
        cell.set(cell.get() + 1);
    }
}

// =============================================================================
// Plugin
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Component,
    Controller,
}

pub struct MockPlugin {
    role: Role,
    spec: Rc<MockSpec>,
    probe: Rc<MockProbe>,
}

impl MockPlugin {
    fn new(role: Role, spec: Rc<MockSpec>, probe: Rc<MockProbe>) -> Self {
        probe.live.set(probe.live.get() + 1);
        Self { role, spec, probe }
    }

    fn name(&self, component: &'static str, controller: &'static str) -> &'static str {
        match self.role {
            Role::Component => component,
            Role::Controller => controller,
        }
    }

    fn audio_channels(&self, dir: BusDirection) -> i32 {
        match dir as BusDirections {
            BusDirections_::kInput => self.spec.inputs,
            _ => self.spec.outputs,
        }
    }

    /// Record what the host handed in with a block.
    ///
    /// # Safety
    /// `data` must point to a valid `ProcessData`.
    unsafe fn capture_inputs(&self, data: &ProcessData) {
        let mut events = self.probe.last_events.borrow_mut();
        events.clear();
        // SAFETY: The host passes a valid event list or null.
        if let Some(list) = unsafe { ComRef::from_raw(data.inputEvents) } {
            // SAFETY: `list` is valid for the duration of the block.
            let count = unsafe { list.getEventCount() };
            for index in 0..count {
                // SAFETY: Event is plain C data; all-zero is a valid value.
                let mut event: Event = unsafe { std::mem::zeroed() };
                // SAFETY: `event` is a valid out-parameter.
                if unsafe { list.getEvent(index, &mut event) } == kResultOk {
                    events.push(event);
                }
            }
        }

        let mut points = self.probe.last_points.borrow_mut();
        points.clear();
        // SAFETY: The host passes a valid parameter change list or null.
        if let Some(changes) = unsafe { ComRef::from_raw(data.inputParameterChanges) } {
            // SAFETY: `changes` and the queues it returns are valid for the block.
            unsafe {
                for index in 0..changes.getParameterCount() {
                    let Some(queue) = ComRef::from_raw(changes.getParameterData(index)) else {
                        continue;
                    };
                    let id = queue.getParameterId();
                    for point in 0..queue.getPointCount() {
                        let (mut offset, mut value) = (0, 0.0);
                        if queue.getPoint(point, &mut offset, &mut value) == kResultOk {
                            points.push((id, offset, value));
                            self.probe.set_value(id, value);
                        }
                    }
                }
            }
        }

        if !data.processContext.is_null() {
            // SAFETY: Checked non-null; the host keeps it valid for the block.
            let context = unsafe { &*data.processContext };
            let tempo = if context.state & kTempoValid != 0 {
                context.tempo
            } else {
                0.0
            };
            self.probe.last_context.set(Some((
                context.sampleRate,
                tempo,
                context.projectTimeSamples,
            )));
        }
    }
}

impl Drop for MockPlugin {
    fn drop(&mut self) {
        self.probe.live.set(self.probe.live.get() - 1);
    }
}

impl Class for MockPlugin {
    type Interfaces = (IComponent, IAudioProcessor, IEditController, IConnectionPoint);
}

impl IPluginBaseTrait for MockPlugin {
    unsafe fn initialize(&self, context: *mut FUnknown) -> tresult {
        let rejected = match self.role {
            Role::Component => self.spec.reject_initialize,
            Role::Controller => self.spec.reject_controller_initialize,
        };
        if rejected || context.is_null() {
            return kResultFalse;
        }
        MockProbe::bump(&self.probe.initialized);
        self.probe
            .record(self.name("component.initialize", "controller.initialize"));
        kResultOk
    }

    unsafe fn terminate(&self) -> tresult {
        MockProbe::bump(&self.probe.terminated);
        self.probe
            .record(self.name("component.terminate", "controller.terminate"));
        kResultOk
    }
}

impl IComponentTrait for MockPlugin {
    unsafe fn getControllerClassId(&self, class_id: *mut TUID) -> tresult {
        if class_id.is_null() {
            return kInvalidArgument;
        }
        if !self.spec.separate_controller {
            return kNotImplemented;
        }
        // SAFETY: Checked non-null above.
        unsafe { *class_id = CONTROLLER_CID };
        kResultOk
    }

    unsafe fn setIoMode(&self, _mode: IoMode) -> tresult {
        kResultOk
    }

    unsafe fn getBusCount(&self, media_type: MediaType, dir: BusDirection) -> i32 {
        match media_type as MediaTypes {
            MediaTypes_::kAudio => i32::from(self.audio_channels(dir) > 0),
            MediaTypes_::kEvent => match dir as BusDirections {
                BusDirections_::kInput => i32::from(self.spec.event_input),
                _ => 0,
            },
            _ => 0,
        }
    }

    unsafe fn getBusInfo(
        &self,
        media_type: MediaType,
        dir: BusDirection,
        index: i32,
        bus: *mut BusInfo,
    ) -> tresult {
        if bus.is_null() || index != 0 {
            return kInvalidArgument;
        }
        if self.spec.fail_bus_info {
            return kResultFalse;
        }
        // SAFETY: Checked non-null above.
        let bus = unsafe { &mut *bus };
        bus.mediaType = media_type;
        bus.direction = dir;
        match media_type as MediaTypes {
            MediaTypes_::kAudio => {
                bus.channelCount = self.audio_channels(dir);
                copy_wstring("Main", &mut bus.name);
            }
            _ => {
                bus.channelCount = 16;
                copy_wstring("MIDI In", &mut bus.name);
            }
        }
        bus.busType = BusTypes_::kMain as BusType;
        bus.flags = BusInfo_::BusFlags_::kDefaultActive;
        kResultOk
    }

    unsafe fn getRoutingInfo(
        &self,
        _in_info: *mut RoutingInfo,
        _out_info: *mut RoutingInfo,
    ) -> tresult {
        kNotImplemented
    }

    unsafe fn activateBus(
        &self,
        media_type: MediaType,
        dir: BusDirection,
        _index: i32,
        _state: TBool,
    ) -> tresult {
        self.probe.activated.borrow_mut().push((media_type, dir));
        kResultOk
    }

    unsafe fn setActive(&self, state: TBool) -> tresult {
        if state != 0 && self.spec.reject_set_active {
            return kResultFalse;
        }
        self.probe.active.set(state != 0);
        self.probe
            .record(if state != 0 { "setActive(1)" } else { "setActive(0)" });
        kResultOk
    }

    unsafe fn setState(&self, _state: *mut IBStream) -> tresult {
        kNotImplemented
    }

    unsafe fn getState(&self, _state: *mut IBStream) -> tresult {
        kNotImplemented
    }
}

impl IAudioProcessorTrait for MockPlugin {
    unsafe fn setBusArrangements(
        &self,
        _inputs: *mut SpeakerArrangement,
        _num_ins: i32,
        _outputs: *mut SpeakerArrangement,
        _num_outs: i32,
    ) -> tresult {
        kResultFalse
    }

    unsafe fn getBusArrangement(
        &self,
        _dir: BusDirection,
        _index: i32,
        _arr: *mut SpeakerArrangement,
    ) -> tresult {
        kNotImplemented
    }

    unsafe fn canProcessSampleSize(&self, symbolic_sample_size: i32) -> tresult {
        match symbolic_sample_size as SymbolicSampleSizes {
            SymbolicSampleSizes_::kSample32 => kResultOk,
            _ => kResultFalse,
        }
    }

    unsafe fn getLatencySamples(&self) -> u32 {
        0
    }

    unsafe fn setupProcessing(&self, setup: *mut ProcessSetup) -> tresult {
        if setup.is_null() {
            return kInvalidArgument;
        }
        if self.spec.reject_setup {
            return kResultFalse;
        }
        // SAFETY: Checked non-null above.
        let setup = unsafe { &*setup };
        self.probe.setup.set(Some((
            setup.sampleRate,
            setup.maxSamplesPerBlock,
            setup.processMode,
            setup.symbolicSampleSize,
        )));
        kResultOk
    }

    unsafe fn setProcessing(&self, state: TBool) -> tresult {
        self.probe.record(if state != 0 {
            "setProcessing(1)"
        } else {
            "setProcessing(0)"
        });
        if state == 0 {
            self.probe.processing.set(false);
            return kResultOk;
        }
        let result = self.spec.set_processing_result;
        self.probe
            .processing
            .set(result == kResultOk || result == kNotImplemented);
        result
    }

    unsafe fn process(&self, data: *mut ProcessData) -> tresult {
        if data.is_null() {
            return kInvalidArgument;
        }
        MockProbe::bump(&self.probe.process_calls);
        if self.spec.reject_process {
            return kResultFalse;
        }
        // SAFETY: Checked non-null above; the host keeps it valid for the call.
        let data = unsafe { &*data };
        // SAFETY: `data` is valid for the call.
        unsafe { self.capture_inputs(data) };

        let frames = data.numSamples.max(0) as usize;
        self.probe.last_frames.set(data.numSamples);
        let note_held = self
            .probe
            .last_events
            .borrow()
            .iter()
            .any(|e| e.r#type == 0);

        if data.numOutputs > 0 && !data.outputs.is_null() {
            // SAFETY: The host binds one valid bus with `numChannels` valid
            // channel pointers of at least `numSamples` frames each.
            unsafe {
                let out_bus = &*data.outputs;
                let in_bus = (data.numInputs > 0 && !data.inputs.is_null()).then(|| &*data.inputs);
                for ch in 0..out_bus.numChannels.max(0) as usize {
                    let out = std::slice::from_raw_parts_mut(
                        *out_bus.__field0.channelBuffers32.add(ch),
                        frames,
                    );
                    match in_bus.filter(|bus| (ch as i32) < bus.numChannels) {
                        Some(bus) => {
                            let input = std::slice::from_raw_parts(
                                *bus.__field0.channelBuffers32.add(ch),
                                frames,
                            );
                            for (o, i) in out.iter_mut().zip(input) {
                                *o = *i * self.spec.gain;
                            }
                        }
                        None => out.fill(if note_held { NOTE_LEVEL } else { 0.0 }),
                    }
                }
            }
        }

        // SAFETY: The host passes a valid output change list or null.
        if let Some(changes) = unsafe { ComRef::from_raw(data.outputParameterChanges) } {
            let mut index = 0;
            let gain = self.probe.value(GAIN_ID).unwrap_or_default();
            // SAFETY: `changes` and the queue it returns are valid for the block.
            unsafe {
                if let Some(queue) = ComRef::from_raw(changes.addParameterData(&GAIN_ID, &mut index))
                {
                    queue.addPoint(0, gain, &mut index);
                }
            }
        }
        kResultOk
    }

    unsafe fn getTailSamples(&self) -> u32 {
        0
    }
}

impl IEditControllerTrait for MockPlugin {
    unsafe fn setComponentState(&self, _state: *mut IBStream) -> tresult {
        kNotImplemented
    }

    unsafe fn setState(&self, _state: *mut IBStream) -> tresult {
        kNotImplemented
    }

    unsafe fn getState(&self, _state: *mut IBStream) -> tresult {
        kNotImplemented
    }

    unsafe fn getParameterCount(&self) -> i32 {
        PARAMETERS.len() as i32
    }

    unsafe fn getParameterInfo(&self, parameter_index: i32, info: *mut ParameterInfo) -> tresult {
        if info.is_null() {
            return kInvalidArgument;
        }
        let Some(parameter) = usize::try_from(parameter_index)
            .ok()
            .and_then(|i| PARAMETERS.get(i))
        else {
            return kInvalidArgument;
        };
        // SAFETY: Checked non-null above.
        let info = unsafe { &mut *info };
        info.id = parameter.id;
        copy_wstring(parameter.title, &mut info.title);
        copy_wstring(parameter.short_title, &mut info.shortTitle);
        copy_wstring(parameter.units, &mut info.units);
        info.stepCount = parameter.steps;
        info.defaultNormalizedValue = parameter.default;
        info.unitId = 0;
        info.flags = parameter.flags;
        kResultOk
    }

    unsafe fn getParamStringByValue(
        &self,
        _id: u32,
        value_normalized: f64,
        string: *mut String128,
    ) -> tresult {
        if string.is_null() {
            return kInvalidArgument;
        }
        // SAFETY: Checked non-null above.
        copy_wstring(&format!("{value_normalized:.2}"), unsafe { &mut *string });
        kResultOk
    }

    unsafe fn getParamValueByString(
        &self,
        _id: u32,
        _string: *mut TChar,
        _value_normalized: *mut f64,
    ) -> tresult {
        kNotImplemented
    }

    unsafe fn normalizedParamToPlain(&self, _id: u32, value_normalized: f64) -> f64 {
        value_normalized
    }

    unsafe fn plainParamToNormalized(&self, _id: u32, plain_value: f64) -> f64 {
        plain_value
    }

    unsafe fn getParamNormalized(&self, id: u32) -> f64 {
        self.probe.value(id).unwrap_or_default()
    }

    unsafe fn setParamNormalized(&self, id: u32, value: f64) -> tresult {
        if self.probe.set_value(id, value) {
            kResultOk
        } else {
            kInvalidArgument
        }
    }

    unsafe fn setComponentHandler(&self, handler: *mut IComponentHandler) -> tresult {
        self.probe.handler_installed.set(!handler.is_null());
        kResultOk
    }

    unsafe fn createView(&self, _name: FIDString) -> *mut IPlugView {
        std::ptr::null_mut()
    }
}

impl IConnectionPointTrait for MockPlugin {
    unsafe fn connect(&self, other: *mut IConnectionPoint) -> tresult {
        if other.is_null() {
            return kInvalidArgument;
        }
        if self.spec.reject_connect && self.role == Role::Controller {
            return kResultFalse;
        }
        MockProbe::bump(&self.probe.connects);
        self.probe
            .record(self.name("component.connect", "controller.connect"));
        kResultOk
    }

    unsafe fn disconnect(&self, _other: *mut IConnectionPoint) -> tresult {
        MockProbe::bump(&self.probe.disconnects);
        self.probe
            .record(self.name("component.disconnect", "controller.disconnect"));
        kResultOk
    }

    unsafe fn notify(&self, _message: *mut IMessage) -> tresult {
        kResultOk
    }
}

// =============================================================================
// Factory
// =============================================================================

pub struct MockFactory {
    spec: Rc<MockSpec>,
    probe: Rc<MockProbe>,
}

struct MockClass {
    cid: TUID,
    category: &'static str,
    name: &'static str,
    sub_categories: &'static str,
}

const CLASSES: [MockClass; 2] = [
    MockClass {
        cid: CONTROLLER_CID,
        category: COMPONENT_CONTROLLER_CLASS,
        name: "Mock Gain Controller",
        sub_categories: "",
    },
    MockClass {
        cid: COMPONENT_CID,
        category: AUDIO_MODULE_CLASS,
        name: "Mock Gain",
        sub_categories: "Fx",
    },
];

fn class(index: i32) -> Option<&'static MockClass> {
    usize::try_from(index).ok().and_then(|i| CLASSES.get(i))
}

impl Class for MockFactory {
    type Interfaces = (IPluginFactory2,);
}

impl IPluginFactoryTrait for MockFactory {
    unsafe fn getFactoryInfo(&self, info: *mut PFactoryInfo) -> tresult {
        if info.is_null() {
            return kInvalidArgument;
        }
        // SAFETY: Checked non-null above.
        let info = unsafe { &mut *info };
        copy_cstring(VENDOR, &mut info.vendor);
        copy_cstring("https://example.com", &mut info.url);
        copy_cstring("test@example.com", &mut info.email);
        info.flags = PFactoryInfo_::FactoryFlags_::kUnicode as int32;
        kResultOk
    }

    unsafe fn countClasses(&self) -> i32 {
        CLASSES.len() as i32
    }

    unsafe fn getClassInfo(&self, index: i32, info: *mut PClassInfo) -> tresult {
        let Some(class) = class(index) else {
            return kInvalidArgument;
        };
        if info.is_null() {
            return kInvalidArgument;
        }
        // SAFETY: Checked non-null above.
        let info = unsafe { &mut *info };
        info.cid = class.cid;
        info.cardinality = PClassInfo_::ClassCardinality_::kManyInstances as int32;
        copy_cstring(class.category, &mut info.category);
        copy_cstring(class.name, &mut info.name);
        kResultOk
    }

    unsafe fn createInstance(
        &self,
        cid: FIDString,
        iid: FIDString,
        obj: *mut *mut c_void,
    ) -> tresult {
        if cid.is_null() || iid.is_null() || obj.is_null() {
            return kInvalidArgument;
        }
        // SAFETY: Class IDs are 16 bytes.
        let requested = unsafe { &*(cid as *const TUID) };
        let role = if *requested == COMPONENT_CID {
            Role::Component
        } else if *requested == CONTROLLER_CID && !self.spec.fail_controller_create {
            Role::Controller
        } else {
            return kInvalidArgument;
        };

        let plugin = ComWrapper::new(MockPlugin::new(
            role,
            self.spec.clone(),
            self.probe.clone(),
        ));
        let Some(unknown) = plugin.as_com_ref::<FUnknown>() else {
            return kNoInterface;
        };
        let ptr = unknown.as_ptr();
        // SAFETY: `ptr` is a live FUnknown; queryInterface adds the reference
        // the caller receives.
        unsafe { ((*(*ptr).vtbl).queryInterface)(ptr, iid as *const TUID, obj) }
    }
}

impl IPluginFactory2Trait for MockFactory {
    unsafe fn getClassInfo2(&self, index: i32, info: *mut PClassInfo2) -> tresult {
        let Some(class) = class(index) else {
            return kInvalidArgument;
        };
        if info.is_null() {
            return kInvalidArgument;
        }
        // SAFETY: Checked non-null above.
        let info = unsafe { &mut *info };
        info.cid = class.cid;
        info.cardinality = PClassInfo_::ClassCardinality_::kManyInstances as int32;
        copy_cstring(class.category, &mut info.category);
        copy_cstring(class.name, &mut info.name);
        info.classFlags = 0;
        copy_cstring(class.sub_categories, &mut info.subCategories);
        copy_cstring(VENDOR, &mut info.vendor);
        copy_cstring("1.0.0", &mut info.version);
        copy_cstring("VST 3.7", &mut info.sdkVersion);
        kResultOk
    }
}

/// A module backed by a fresh mock factory.
pub fn module(spec: MockSpec) -> (Module, Rc<MockProbe>) {
    let probe = Rc::new(MockProbe::new());
    let factory = ComWrapper::new(MockFactory {
        spec: Rc::new(spec),
        probe: probe.clone(),
    });
    let factory = factory
        .to_com_ptr::<IPluginFactory>()
        .expect("factory exposes IPluginFactory");
    (Module::from_factory(factory), probe)
}
