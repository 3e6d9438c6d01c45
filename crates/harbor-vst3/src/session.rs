//! Processing setup and the per-block call.
//!
//! A [`ProcessingSession`] exists once `setupProcessing` has been accepted.
//! It owns every buffer and COM list the block path touches, sized at setup,
//! so [`ProcessingSession::process`] never allocates.
//!
//! # Per-block flow
//!
//! ```text
//! bind caller channels ─► fill event / parameter lists ─► build ProcessData
//!        ─► IAudioProcessor::process ─► release bindings
//!        ─► on success: clear events, advance transport, collect output changes
//! ```

use harbor_core::types::MAX_BLOCK_SIZE;
use harbor_core::{BusLayout, EventQueue, HostConfig, HostError, HostResult, ParameterQueue, ProcessBuffers};
use log::{debug, info};
use vst3::Steinberg::kResultOk;
use vst3::Steinberg::Vst::ProcessContext_::StatesAndFlags_::{
    kPlaying, kProjectTimeMusicValid, kTempoValid, kTimeSigValid,
};
use vst3::Steinberg::Vst::SymbolicSampleSizes_::kSample32;
use vst3::Steinberg::Vst::{
    AudioBusBuffers, AudioBusBuffers__type0, IAudioProcessorTrait as _, IEventList,
    IParameterChanges, ProcessContext, ProcessData, ProcessSetup,
};
use vst3::ComWrapper;

use crate::bus::activate_main_buses;
use crate::component::Wiring;
use crate::event_list::{HostEventList, HostParameterChanges};

/// Caller-facing staging for the next block.
#[derive(Debug, Clone)]
pub struct Queues {
    /// Events for the next block. Cleared by each successful process call.
    pub events: EventQueue,
    /// Parameter changes for the next block. Cleared only on request.
    pub changes: ParameterQueue,
    /// Changes the plugin reported during the last block.
    pub output_changes: ParameterQueue,
}

impl Queues {
    /// Queues for a plugin exposing `parameters` parameters. Every one of
    /// them gets a slot, even beyond the configured capacity.
    pub fn new(config: &HostConfig, parameters: usize) -> Self {
        let parameters = || {
            ParameterQueue::with_capacity(
                config.parameter_queue_capacity.max(parameters),
                config.points_per_parameter,
            )
        };
        Self {
            events: EventQueue::with_capacity(config.event_capacity),
            changes: parameters(),
            output_changes: parameters(),
        }
    }

    /// Revalidate every queue against a new block size.
    pub fn set_block_size(&mut self, block_size: u32) {
        self.events.set_block_size(block_size);
        self.changes.set_block_size(block_size);
        self.output_changes.set_block_size(block_size);
        self.output_changes.clear();
    }
}

/// Negotiated processing state for one plugin.
pub struct ProcessingSession {
    buffers: ProcessBuffers,
    events: ComWrapper<HostEventList>,
    input_changes: ComWrapper<HostParameterChanges>,
    output_changes: ComWrapper<HostParameterChanges>,
    layout: BusLayout,
    sample_rate: f64,
    max_block_size: usize,
    process_mode: i32,
    tempo: f64,
    position: i64,
}

impl ProcessingSession {
    /// Negotiate processing with the plugin.
    ///
    /// Nothing on the plugin side changes state when this fails, except for
    /// bus activation, which is harmless to repeat.
    /// The COM lists are sized to match `queues`.
    pub fn setup(
        wiring: &Wiring,
        layout: &BusLayout,
        config: &HostConfig,
        queues: &Queues,
        sample_rate: f64,
        max_block_size: usize,
    ) -> HostResult<Self> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(HostError::Setup(format!(
                "sample rate must be positive and finite, got {sample_rate}"
            )));
        }
        if max_block_size == 0 || max_block_size > MAX_BLOCK_SIZE {
            return Err(HostError::Setup(format!(
                "block size must be in 1..={MAX_BLOCK_SIZE}, got {max_block_size}"
            )));
        }

        activate_main_buses(wiring.component(), layout);

        let processor = wiring.processor();
        // SAFETY: Processor pointer is valid while the wiring is alive.
        if unsafe { processor.canProcessSampleSize(kSample32 as i32) } != kResultOk {
            return Err(HostError::Setup(
                "plugin cannot process 32-bit float samples".into(),
            ));
        }

        let process_mode = config.process_mode.as_vst3();
        let mut setup = ProcessSetup {
            processMode: process_mode,
            symbolicSampleSize: kSample32 as i32,
            maxSamplesPerBlock: max_block_size as i32,
            sampleRate: sample_rate,
        };
        // SAFETY: `setup` is valid for the duration of the call.
        let result = unsafe { processor.setupProcessing(&mut setup) };
        if result != kResultOk {
            return Err(HostError::Setup(format!(
                "plugin rejected setupProcessing (result={result})"
            )));
        }

        info!(
            "Processing configured: {sample_rate} Hz, {max_block_size} samples, {} in / {} out",
            layout.input_channels, layout.output_channels
        );
        Ok(Self {
            buffers: ProcessBuffers::allocate(layout, max_block_size),
            events: ComWrapper::new(HostEventList::with_capacity(queues.events.capacity())),
            input_changes: ComWrapper::new(HostParameterChanges::with_capacity(
                queues.changes.capacity(),
                config.points_per_parameter,
            )),
            output_changes: ComWrapper::new(HostParameterChanges::with_capacity(
                queues.output_changes.capacity(),
                config.points_per_parameter,
            )),
            layout: *layout,
            sample_rate,
            max_block_size,
            process_mode,
            tempo: config.tempo,
            position: 0,
        })
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Transport position in samples.
    #[inline]
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Run one block.
    ///
    /// Channel and length checks happen before the plugin is called. On
    /// success the event queue is cleared and the output changes replaced;
    /// on failure both are left untouched.
    pub fn process<'i, 'o, I, O>(
        &mut self,
        wiring: &Wiring,
        inputs: I,
        outputs: O,
        num_samples: usize,
        queues: &mut Queues,
    ) -> HostResult<()>
    where
        I: IntoIterator<Item = &'i [f32]>,
        O: IntoIterator<Item = &'o mut [f32]>,
    {
        self.buffers.bind_inputs(inputs, num_samples)?;
        if let Err(e) = self.buffers.bind_outputs(outputs, num_samples) {
            self.buffers.release();
            return Err(e.into());
        }

        self.events.fill(&queues.events);
        self.input_changes.fill(&queues.changes);
        self.output_changes.clear();

        let mut context = self.context();
        let mut input_bus = AudioBusBuffers {
            numChannels: self.buffers.num_input_ptrs() as i32,
            silenceFlags: 0,
            __field0: AudioBusBuffers__type0 {
                channelBuffers32: self.buffers.input_ptrs(),
            },
        };
        let mut output_bus = AudioBusBuffers {
            numChannels: self.buffers.num_output_ptrs() as i32,
            silenceFlags: 0,
            __field0: AudioBusBuffers__type0 {
                channelBuffers32: self.buffers.output_ptrs(),
            },
        };

        let has_input = self.layout.has_audio_input();
        let has_output = self.layout.has_audio_output();
        let mut data = ProcessData {
            processMode: self.process_mode,
            symbolicSampleSize: kSample32 as i32,
            numSamples: num_samples as i32,
            numInputs: i32::from(has_input),
            numOutputs: i32::from(has_output),
            inputs: if has_input {
                &mut input_bus
            } else {
                std::ptr::null_mut()
            },
            outputs: if has_output {
                &mut output_bus
            } else {
                std::ptr::null_mut()
            },
            inputParameterChanges: self
                .input_changes
                .as_com_ref::<IParameterChanges>()
                .map_or(std::ptr::null_mut(), |list| list.as_ptr()),
            outputParameterChanges: self
                .output_changes
                .as_com_ref::<IParameterChanges>()
                .map_or(std::ptr::null_mut(), |list| list.as_ptr()),
            inputEvents: if self.layout.has_event_input {
                self.events
                    .as_com_ref::<IEventList>()
                    .map_or(std::ptr::null_mut(), |list| list.as_ptr())
            } else {
                std::ptr::null_mut()
            },
            outputEvents: std::ptr::null_mut(),
            processContext: &mut context,
        };

        // SAFETY: Every pointer in `data` refers to storage that outlives the
        // call: the bound channels (caller buffers or scratch), the bus
        // structs and context on this stack frame, and the COM lists owned by
        // this session.
        let result = unsafe { wiring.processor().process(&mut data) };
        self.buffers.release();
        self.events.clear();
        self.input_changes.clear();

        if result != kResultOk {
            return Err(HostError::Process(format!(
                "plugin process failed (result={result})"
            )));
        }

        queues.events.clear();
        self.position += num_samples as i64;
        self.output_changes.drain_into(&mut queues.output_changes);
        if !queues.output_changes.is_empty() {
            debug!(
                "Plugin reported {} output parameter changes",
                queues.output_changes.len()
            );
        }
        Ok(())
    }

    fn context(&self) -> ProcessContext {
        // SAFETY: ProcessContext is plain C data; all-zero is a valid value.
        let mut context: ProcessContext = unsafe { std::mem::zeroed() };
        context.state = kPlaying | kTempoValid | kTimeSigValid | kProjectTimeMusicValid;
        context.sampleRate = self.sample_rate;
        context.projectTimeSamples = self.position;
        context.projectTimeMusic = self.position as f64 / self.sample_rate * self.tempo / 60.0;
        context.tempo = self.tempo;
        context.timeSigNumerator = 4;
        context.timeSigDenominator = 4;
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::negotiate;
    use crate::host::HostContext;
    use crate::mock::{self, MockSpec};
    use crate::module::Module;
    use harbor_core::MidiEvent;
    use std::rc::Rc;

    struct Fixture {
        session: ProcessingSession,
        queues: Queues,
        wiring: Wiring,
        probe: Rc<mock::MockProbe>,
        _module: Module,
    }

    fn fixture(spec: MockSpec, block: usize) -> Fixture {
        let (module, probe) = mock::module(spec);
        let class = module.audio_module_class().unwrap();
        let wiring = Wiring::wire(&module, &class, &HostContext::default()).unwrap();
        let layout = negotiate(wiring.component()).unwrap();
        let config = HostConfig::new();
        let mut queues = Queues::new(&config, mock::PARAMETER_COUNT);
        let session =
            ProcessingSession::setup(&wiring, &layout, &config, &queues, 48_000.0, block).unwrap();
        queues.set_block_size(block as u32);
        Fixture {
            session,
            queues,
            wiring,
            probe,
            _module: module,
        }
    }

    fn try_setup(spec: MockSpec, rate: f64, block: usize) -> HostResult<ProcessingSession> {
        let (module, _probe) = mock::module(spec);
        let class = module.audio_module_class().unwrap();
        let wiring = Wiring::wire(&module, &class, &HostContext::default()).unwrap();
        let layout = negotiate(wiring.component()).unwrap();
        let config = HostConfig::new();
        let queues = Queues::new(&config, 0);
        ProcessingSession::setup(&wiring, &layout, &config, &queues, rate, block)
    }

    #[test]
    fn test_setup_reaches_plugin() {
        let f = fixture(MockSpec::effect(), 256);
        let (rate, block, mode, size) = f.probe.setup.get().unwrap();
        assert_eq!(rate, 48_000.0);
        assert_eq!(block, 256);
        assert_eq!(mode, HostConfig::new().process_mode.as_vst3());
        assert_eq!(size, kSample32 as i32);
        assert_eq!(f.session.max_block_size(), 256);
    }

    #[test]
    fn test_setup_validation() {
        for rate in [0.0, -44_100.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                try_setup(MockSpec::effect(), rate, 512),
                Err(HostError::Setup(_))
            ));
        }
        assert!(try_setup(MockSpec::effect(), 44_100.0, 0).is_err());
        let spec = MockSpec {
            reject_setup: true,
            ..MockSpec::effect()
        };
        assert!(matches!(
            try_setup(spec, 44_100.0, 512),
            Err(HostError::Setup(_))
        ));
    }

    #[test]
    fn test_process_applies_gain() {
        let mut f = fixture(MockSpec::effect(), 64);
        let left = [1.0f32; 64];
        let right = [0.5f32; 64];
        let mut out_l = [9.0f32; 64];
        let mut out_r = [9.0f32; 64];
        f.session
            .process(
                &f.wiring,
                [&left[..], &right[..]],
                [&mut out_l[..], &mut out_r[..]],
                32,
                &mut f.queues,
            )
            .unwrap();
        assert!(out_l[..32].iter().all(|&s| s == 0.5));
        assert!(out_r[..32].iter().all(|&s| s == 0.25));
        // Frames past the block are untouched.
        assert_eq!(out_l[32], 9.0);
        assert_eq!(f.probe.last_frames.get(), 32);
        assert_eq!(f.session.position(), 32);
    }

    #[test]
    fn test_missing_output_channel_is_bound_to_scratch() {
        let mut f = fixture(MockSpec::effect(), 16);
        let input = [1.0f32; 16];
        let mut out = [0.0f32; 16];
        f.session
            .process(&f.wiring, [&input[..]], [&mut out[..]], 16, &mut f.queues)
            .unwrap();
        assert!(out.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_too_many_channels_never_reaches_plugin() {
        let mut f = fixture(MockSpec::effect(), 16);
        let input = [0.0f32; 16];
        let result = f.session.process(
            &f.wiring,
            [&input[..], &input[..], &input[..]],
            std::iter::empty::<&mut [f32]>(),
            16,
            &mut f.queues,
        );
        assert!(matches!(result, Err(HostError::Range(_))));
        assert_eq!(f.probe.process_calls.get(), 0);
    }

    #[test]
    fn test_events_consumed_once() {
        let mut f = fixture(MockSpec::instrument(), 32);
        f.queues
            .events
            .push(0, MidiEvent::note_on(0, 60, 100).unwrap())
            .unwrap();
        let mut out_l = [0.0f32; 32];
        let mut out_r = [0.0f32; 32];
        f.session
            .process(
                &f.wiring,
                std::iter::empty::<&[f32]>(),
                [&mut out_l[..], &mut out_r[..]],
                32,
                &mut f.queues,
            )
            .unwrap();
        assert_eq!(f.probe.last_events.borrow().len(), 1);
        assert!(out_l.iter().all(|&s| s == mock::NOTE_LEVEL));
        assert!(f.queues.events.is_empty());

        f.session
            .process(
                &f.wiring,
                std::iter::empty::<&[f32]>(),
                [&mut out_l[..], &mut out_r[..]],
                32,
                &mut f.queues,
            )
            .unwrap();
        assert!(f.probe.last_events.borrow().is_empty());
        assert!(out_l.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_failed_process_keeps_events() {
        let spec = MockSpec {
            reject_process: true,
            ..MockSpec::instrument()
        };
        let mut f = fixture(spec, 32);
        f.queues
            .events
            .push(3, MidiEvent::note_on(0, 60, 100).unwrap())
            .unwrap();
        let result = f.session.process(
            &f.wiring,
            std::iter::empty::<&[f32]>(),
            std::iter::empty::<&mut [f32]>(),
            32,
            &mut f.queues,
        );
        assert!(matches!(result, Err(HostError::Process(_))));
        assert_eq!(f.queues.events.len(), 1);
        assert_eq!(f.session.position(), 0);
    }

    #[test]
    fn test_transport_and_parameters() {
        let mut f = fixture(MockSpec::effect(), 128);
        f.queues.changes.push(mock::GAIN_ID, 0.25, 0).unwrap();
        f.queues.changes.push(mock::GAIN_ID, 0.75, 64).unwrap();

        for _ in 0..2 {
            f.session
                .process(
                    &f.wiring,
                    std::iter::empty::<&[f32]>(),
                    std::iter::empty::<&mut [f32]>(),
                    128,
                    &mut f.queues,
                )
                .unwrap();
        }

        let (rate, tempo, position) = f.probe.last_context.get().unwrap();
        assert_eq!(rate, 48_000.0);
        assert_eq!(tempo, HostConfig::new().tempo);
        assert_eq!(position, 128);

        // Parameter changes are re-sent until cleared.
        assert_eq!(
            *f.probe.last_points.borrow(),
            vec![(mock::GAIN_ID, 0, 0.25), (mock::GAIN_ID, 64, 0.75)]
        );
        assert_eq!(f.queues.changes.len(), 1);

        let reported = f.queues.output_changes.points(mock::GAIN_ID).unwrap();
        assert_eq!(reported[0].value, 0.75);
    }
}
