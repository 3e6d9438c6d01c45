//! Process-time COM objects handed to the plugin with every block.
//!
//! - [`HostEventList`] - `IEventList` carrying the queued MIDI events
//! - [`HostParameterChanges`] - `IParameterChanges` carrying automation points,
//!   also used as the output list the plugin writes into
//!
//! All storage is allocated once at setup. Filling and clearing between
//! blocks reuses it.
//!
//! # Interior mutability
//!
//! The plugin only sees these objects through `&self` COM calls, so state
//! lives in `UnsafeCell`s. The types are `!Sync` and the host never touches
//! them while a plugin call is in flight, so no two references into a cell
//! are ever live at once.

use std::cell::UnsafeCell;

use harbor_core::midi::normalize_velocity;
use harbor_core::{EventQueue, MidiEvent, ParameterQueue, TimedEvent};
use log::debug;
use vst3::Steinberg::Vst::{
    Event, IEventList, IEventListTrait, IParamValueQueue, IParamValueQueueTrait,
    IParameterChanges, IParameterChangesTrait, ParamID, ParamValue,
};
use vst3::Steinberg::{int32, kInvalidArgument, kResultFalse, kResultOk, tresult};
use vst3::{Class, ComWrapper};

// VST3 event type constants
const K_NOTE_ON_EVENT: u16 = 0;
const K_NOTE_OFF_EVENT: u16 = 1;
const K_LEGACY_MIDI_CC_OUT_EVENT: u16 = 65535;

// Event flag: event is played live, not read from a sequencer track
const K_IS_LIVE: u16 = 1 << 0;

// LegacyMIDICCOutEvent controlNumber special value
const LEGACY_CC_PROGRAM_CHANGE: u8 = 130;

// =============================================================================
// Event translation
// =============================================================================

/// Translate a queued event into a VST3 event on bus 0.
pub fn to_vst3_event(timed: &TimedEvent) -> Event {
    // SAFETY: Event is a C struct with no invalid bit patterns; zeroed is a valid state.
    let mut event: Event = unsafe { std::mem::zeroed() };
    event.busIndex = 0;
    event.sampleOffset = timed.sample_offset as i32;
    event.ppqPosition = 0.0;
    event.flags = K_IS_LIVE;

    match timed.event {
        MidiEvent::NoteOn {
            channel,
            note,
            velocity,
        } => {
            event.r#type = K_NOTE_ON_EVENT;
            event.__field0.noteOn.channel = i16::from(channel);
            event.__field0.noteOn.pitch = i16::from(note);
            event.__field0.noteOn.velocity = normalize_velocity(velocity);
            event.__field0.noteOn.noteId = -1;
            event.__field0.noteOn.tuning = 0.0;
            event.__field0.noteOn.length = 0;
        }
        MidiEvent::NoteOff { channel, note } => {
            event.r#type = K_NOTE_OFF_EVENT;
            event.__field0.noteOff.channel = i16::from(channel);
            event.__field0.noteOff.pitch = i16::from(note);
            event.__field0.noteOff.velocity = 0.0;
            event.__field0.noteOff.noteId = -1;
            event.__field0.noteOff.tuning = 0.0;
        }
        MidiEvent::ControlChange {
            channel,
            controller,
            value,
        } => {
            event.r#type = K_LEGACY_MIDI_CC_OUT_EVENT;
            event.__field0.midiCCOut.controlNumber = controller;
            event.__field0.midiCCOut.channel = channel as i8;
            event.__field0.midiCCOut.value = value as i8;
            event.__field0.midiCCOut.value2 = 0;
        }
        // Never queued (the event queue expands it), translated for completeness.
        MidiEvent::ProgramChange { channel, program } => {
            event.r#type = K_LEGACY_MIDI_CC_OUT_EVENT;
            event.__field0.midiCCOut.controlNumber = LEGACY_CC_PROGRAM_CHANGE;
            event.__field0.midiCCOut.channel = channel as i8;
            event.__field0.midiCCOut.value = program as i8;
            event.__field0.midiCCOut.value2 = 0;
        }
    }
    event
}

// =============================================================================
// IEventList
// =============================================================================

/// Read-only event list for the plugin's event input bus.
pub struct HostEventList {
    events: UnsafeCell<Vec<Event>>,
}

impl HostEventList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: UnsafeCell::new(Vec::with_capacity(capacity)),
        }
    }

    /// Replace the list's content with `queue`. Never allocates when the list
    /// was created with at least `queue.capacity()`.
    pub fn fill(&self, queue: &EventQueue) {
        // SAFETY: No other reference into the cell exists (see module docs).
        let events = unsafe { &mut *self.events.get() };
        events.clear();
        events.extend(queue.iter().map(to_vst3_event));
    }

    pub fn clear(&self) {
        // SAFETY: No other reference into the cell exists (see module docs).
        unsafe { (*self.events.get()).clear() };
    }

    pub fn len(&self) -> usize {
        // SAFETY: No other reference into the cell exists (see module docs).
        unsafe { (*self.events.get()).len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Class for HostEventList {
    type Interfaces = (IEventList,);
}

impl IEventListTrait for HostEventList {
    unsafe fn getEventCount(&self) -> int32 {
        self.len() as int32
    }

    unsafe fn getEvent(&self, index: int32, e: *mut Event) -> tresult {
        if e.is_null() {
            return kInvalidArgument;
        }
        // SAFETY: No other reference into the cell exists (see module docs).
        let events = unsafe { &*self.events.get() };
        match usize::try_from(index).ok().and_then(|i| events.get(i)) {
            Some(event) => {
                // SAFETY: Validated e is non-null above. Plugin guarantees it
                // points to a writable Event.
                unsafe { *e = *event };
                kResultOk
            }
            None => kInvalidArgument,
        }
    }

    unsafe fn addEvent(&self, _e: *mut Event) -> tresult {
        kResultFalse
    }
}

// =============================================================================
// IParamValueQueue
// =============================================================================

/// Automation points for one parameter.
pub struct HostParamValueQueue {
    id: UnsafeCell<ParamID>,
    points: UnsafeCell<Vec<(int32, ParamValue)>>,
    capacity: usize,
}

impl HostParamValueQueue {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            id: UnsafeCell::new(0),
            points: UnsafeCell::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    fn reset(&self, id: ParamID) {
        // SAFETY: No other reference into the cells exists (see module docs).
        unsafe {
            *self.id.get() = id;
            (*self.points.get()).clear();
        }
    }

    fn id(&self) -> ParamID {
        // SAFETY: No other reference into the cell exists (see module docs).
        unsafe { *self.id.get() }
    }

    fn points(&self) -> &[(int32, ParamValue)] {
        // SAFETY: Shared view; the host does not mutate the queue while the
        // returned slice is borrowed.
        unsafe { &*self.points.get() }
    }

    /// Insert keeping offset order; a point at an existing offset replaces it.
    fn insert(&self, sample_offset: int32, value: ParamValue) -> Option<usize> {
        // SAFETY: No other reference into the cell exists (see module docs).
        let points = unsafe { &mut *self.points.get() };
        let at = points.partition_point(|&(offset, _)| offset < sample_offset);
        if let Some(existing) = points.get_mut(at) {
            if existing.0 == sample_offset {
                existing.1 = value;
                return Some(at);
            }
        }
        if points.len() == self.capacity {
            return None;
        }
        points.insert(at, (sample_offset, value));
        Some(at)
    }
}

impl Class for HostParamValueQueue {
    type Interfaces = (IParamValueQueue,);
}

impl IParamValueQueueTrait for HostParamValueQueue {
    unsafe fn getParameterId(&self) -> ParamID {
        self.id()
    }

    unsafe fn getPointCount(&self) -> int32 {
        self.points().len() as int32
    }

    unsafe fn getPoint(
        &self,
        index: int32,
        sample_offset: *mut int32,
        value: *mut ParamValue,
    ) -> tresult {
        if sample_offset.is_null() || value.is_null() {
            return kInvalidArgument;
        }
        match usize::try_from(index).ok().and_then(|i| self.points().get(i)) {
            Some(&(offset, point)) => {
                // SAFETY: Validated both pointers are non-null above. Plugin
                // guarantees they are writable.
                unsafe {
                    *sample_offset = offset;
                    *value = point;
                }
                kResultOk
            }
            None => kInvalidArgument,
        }
    }

    unsafe fn addPoint(
        &self,
        sample_offset: int32,
        value: ParamValue,
        index: *mut int32,
    ) -> tresult {
        if sample_offset < 0 {
            return kInvalidArgument;
        }
        match self.insert(sample_offset, value) {
            Some(at) => {
                if !index.is_null() {
                    // SAFETY: Validated index is non-null above.
                    unsafe { *index = at as int32 };
                }
                kResultOk
            }
            None => kResultFalse,
        }
    }
}

// =============================================================================
// IParameterChanges
// =============================================================================

/// Per-block set of changed parameters.
pub struct HostParameterChanges {
    count: UnsafeCell<usize>,
    queues: Vec<ComWrapper<HostParamValueQueue>>,
}

impl HostParameterChanges {
    /// Room for `parameters` distinct ids with `points` points each.
    pub fn with_capacity(parameters: usize, points: usize) -> Self {
        Self {
            count: UnsafeCell::new(0),
            queues: (0..parameters)
                .map(|_| ComWrapper::new(HostParamValueQueue::with_capacity(points)))
                .collect(),
        }
    }

    fn count(&self) -> usize {
        // SAFETY: No other reference into the cell exists (see module docs).
        unsafe { *self.count.get() }
    }

    fn set_count(&self, count: usize) {
        // SAFETY: No other reference into the cell exists (see module docs).
        unsafe { *self.count.get() = count };
    }

    /// Replace the content with `changes`.
    pub fn fill(&self, changes: &ParameterQueue) {
        let mut count = 0;
        for ((id, points), queue) in changes.iter().zip(&self.queues) {
            queue.reset(id);
            for point in points {
                if queue.insert(point.sample_offset as int32, point.value).is_none() {
                    debug!("Dropping automation point for parameter {id}: queue full");
                }
            }
            count += 1;
        }
        self.set_count(count);
    }

    /// Copy what the plugin wrote into `out`. Points outside the normalized
    /// range or block are dropped.
    pub fn drain_into(&self, out: &mut ParameterQueue) {
        out.clear();
        for queue in &self.queues[..self.count()] {
            let id = queue.id();
            for &(offset, value) in queue.points() {
                if let Err(e) = out.push(id, value, offset.max(0) as u32) {
                    debug!("Ignoring output change for parameter {id}: {e}");
                }
            }
        }
    }

    pub fn clear(&self) {
        self.set_count(0);
    }

    pub fn len(&self) -> usize {
        self.count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

impl Class for HostParameterChanges {
    type Interfaces = (IParameterChanges,);
}

impl IParameterChangesTrait for HostParameterChanges {
    unsafe fn getParameterCount(&self) -> int32 {
        self.count() as int32
    }

    unsafe fn getParameterData(&self, index: int32) -> *mut IParamValueQueue {
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.count())
            .and_then(|i| self.queues[i].as_com_ref::<IParamValueQueue>())
            .map_or(std::ptr::null_mut(), |queue| queue.as_ptr())
    }

    unsafe fn addParameterData(&self, id: *const ParamID, index: *mut int32) -> *mut IParamValueQueue {
        if id.is_null() {
            return std::ptr::null_mut();
        }
        // SAFETY: Validated id is non-null above.
        let id = unsafe { *id };
        let count = self.count();

        let slot = match self.queues[..count].iter().position(|q| q.id() == id) {
            Some(existing) => existing,
            None if count < self.queues.len() => {
                self.queues[count].reset(id);
                self.set_count(count + 1);
                count
            }
            None => return std::ptr::null_mut(),
        };

        if !index.is_null() {
            // SAFETY: Validated index is non-null above.
            unsafe { *index = slot as int32 };
        }
        self.queues[slot]
            .as_com_ref::<IParamValueQueue>()
            .map_or(std::ptr::null_mut(), |queue| queue.as_ptr())
    }
}
