//! Pre-allocated parameter automation for the next block.
//!
//! Each changed parameter owns a slot holding `(sample offset, value)` points
//! in offset order. Slots and points are allocated up front; pushing never
//! grows storage. The queue is not cleared by processing; callers clear it
//! explicitly once the changes should stop being re-sent.

use log::debug;

use crate::error::{HostError, HostResult, RangeError};
use crate::types::ParameterId;

/// One automation point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterPoint {
    /// Sample index within the block.
    pub sample_offset: u32,
    /// Normalized value.
    pub value: f64,
}

#[derive(Debug, Clone)]
struct Slot {
    id: ParameterId,
    points: Vec<ParameterPoint>,
}

/// Fixed-capacity collection of per-parameter point lists.
#[derive(Debug, Clone)]
pub struct ParameterQueue {
    slots: Vec<Slot>,
    used: usize,
    points_per_parameter: usize,
    block_size: u32,
}

impl ParameterQueue {
    /// Create a queue holding up to `parameters` distinct ids with
    /// `points_per_parameter` points each.
    pub fn with_capacity(parameters: usize, points_per_parameter: usize) -> Self {
        let slots = (0..parameters)
            .map(|_| Slot {
                id: 0,
                points: Vec::with_capacity(points_per_parameter),
            })
            .collect();
        Self {
            slots,
            used: 0,
            points_per_parameter,
            block_size: 0,
        }
    }

    /// Set the block size offsets are validated against.
    ///
    /// Points at offset 0 are accepted even before a block size is known.
    pub fn set_block_size(&mut self, block_size: u32) {
        self.block_size = block_size;
        let mut dropped = 0;
        for slot in &mut self.slots[..self.used] {
            let before = slot.points.len();
            slot.points.retain(|p| p.sample_offset < block_size.max(1));
            dropped += before - slot.points.len();
        }
        if dropped > 0 {
            debug!("Dropped {dropped} automation points beyond block size {block_size}");
        }
    }

    /// Check whether [`push`](Self::push) would accept the point, without
    /// queuing it.
    pub fn admits(&self, id: ParameterId, value: f64, sample_offset: u32) -> HostResult<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(HostError::Parameter(format!(
                "value {} for parameter {} is outside 0.0..=1.0",
                value, id
            )));
        }
        if sample_offset != 0 {
            RangeError::check(
                "sample offset",
                i64::from(sample_offset),
                i64::from(self.block_size),
            )?;
        }

        let Some(slot) = self.slots[..self.used].iter().find(|s| s.id == id) else {
            if self.used == self.slots.len() {
                return Err(HostError::Parameter(format!(
                    "cannot queue parameter {}: {} parameters already changed this block",
                    id, self.used
                )));
            }
            return Ok(());
        };
        let overwrites = slot
            .points
            .binary_search_by_key(&sample_offset, |p| p.sample_offset)
            .is_ok();
        if !overwrites && slot.points.len() == self.points_per_parameter {
            return Err(HostError::Parameter(format!(
                "parameter {} already has {} points this block",
                id, self.points_per_parameter
            )));
        }
        Ok(())
    }

    /// Queue `value` for `id` at `sample_offset`.
    ///
    /// A point already queued at the same offset is overwritten.
    pub fn push(&mut self, id: ParameterId, value: f64, sample_offset: u32) -> HostResult<()> {
        self.admits(id, value, sample_offset)?;

        let index = match self.slots[..self.used].iter().position(|s| s.id == id) {
            Some(index) => index,
            None => {
                let slot = &mut self.slots[self.used];
                slot.id = id;
                slot.points.clear();
                self.used += 1;
                self.used - 1
            }
        };

        let points = &mut self.slots[index].points;
        let at = points.partition_point(|p| p.sample_offset < sample_offset);
        match points.get_mut(at) {
            Some(existing) if existing.sample_offset == sample_offset => existing.value = value,
            _ => points.insert(
                at,
                ParameterPoint {
                    sample_offset,
                    value,
                },
            ),
        }
        Ok(())
    }

    /// Iterate changed parameters with their points.
    pub fn iter(&self) -> impl Iterator<Item = (ParameterId, &[ParameterPoint])> {
        self.slots[..self.used]
            .iter()
            .map(|slot| (slot.id, slot.points.as_slice()))
    }

    /// Points queued for `id`, if any.
    pub fn points(&self, id: ParameterId) -> Option<&[ParameterPoint]> {
        self.slots[..self.used]
            .iter()
            .find(|slot| slot.id == id)
            .map(|slot| slot.points.as_slice())
    }

    /// Number of distinct parameters with queued points.
    #[inline]
    pub fn len(&self) -> usize {
        self.used
    }

    /// Whether nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Maximum number of distinct parameters.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Drop every queued point. O(1), keeps the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.used = 0;
    }
}
