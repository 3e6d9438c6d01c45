//! Pre-allocated queue of sample-accurate events for the next block.
//!
//! The queue is sized once from the host configuration and never grows, so
//! pushing from a real-time thread does not allocate. Events are kept sorted
//! by sample offset; events sharing an offset stay in insertion order.

use log::debug;

use crate::error::{HostResult, RangeError};
use crate::midi::{MidiEvent, TimedEvent};

/// Fixed-capacity, offset-ordered event queue.
#[derive(Debug, Clone)]
pub struct EventQueue {
    events: Vec<TimedEvent>,
    capacity: usize,
    block_size: u32,
}

impl EventQueue {
    /// Create an empty queue. No events are admitted until
    /// [`set_block_size`](Self::set_block_size) has been called.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
            block_size: 0,
        }
    }

    /// Set the block size offsets are validated against. Clears the queue,
    /// because pending offsets refer to the previous block size.
    pub fn set_block_size(&mut self, block_size: u32) {
        self.block_size = block_size;
        if !self.events.is_empty() {
            debug!(
                "Dropped {} pending events on block size change to {block_size}",
                self.events.len()
            );
            self.events.clear();
        }
    }

    /// Block size offsets are validated against (0 before setup).
    #[inline]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Validate and queue an event.
    ///
    /// Program changes are expanded into two control changes
    /// (see [`MidiEvent::program_change_as_controls`]); both are admitted or
    /// neither is.
    pub fn push(&mut self, sample_offset: u32, event: MidiEvent) -> HostResult<()> {
        event.validate()?;
        RangeError::check(
            "sample offset",
            i64::from(sample_offset),
            i64::from(self.block_size),
        )?;

        match event {
            MidiEvent::ProgramChange { channel, program } => {
                self.reserve(2)?;
                for control in MidiEvent::program_change_as_controls(channel, program) {
                    self.insert(sample_offset, control);
                }
            }
            _ => {
                self.reserve(1)?;
                self.insert(sample_offset, event);
            }
        }
        Ok(())
    }

    fn reserve(&self, count: usize) -> HostResult<()> {
        let needed = self.events.len() + count;
        if needed > self.capacity {
            return Err(RangeError::new(
                "queued events",
                needed as i64,
                self.capacity as i64 + 1,
            )
            .into());
        }
        Ok(())
    }

    fn insert(&mut self, sample_offset: u32, event: MidiEvent) {
        let index = self
            .events
            .partition_point(|queued| queued.sample_offset <= sample_offset);
        self.events.insert(
            index,
            TimedEvent {
                sample_offset,
                event,
            },
        );
    }

    /// Queued events in delivery order.
    #[inline]
    pub fn as_slice(&self) -> &[TimedEvent] {
        &self.events
    }

    /// Iterate queued events in delivery order.
    pub fn iter(&self) -> std::slice::Iter<'_, TimedEvent> {
        self.events.iter()
    }

    /// Number of queued events.
    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum number of queued events.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every queued event. O(1), keeps the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl<'a> IntoIterator for &'a EventQueue {
    type Item = &'a TimedEvent;
    type IntoIter = std::slice::Iter<'a, TimedEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
