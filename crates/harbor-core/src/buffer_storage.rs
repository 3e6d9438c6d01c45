//! Pre-allocated buffer storage for real-time safe block processing.
//!
//! [`ProcessBuffers`] owns everything the per-block path needs to hand audio
//! to a plugin without touching the allocator:
//!
//! - input scratch: caller input is copied here so the plugin can never write
//!   into caller memory through an input pointer
//! - output scratch: backs output channels the caller did not supply, so the
//!   plugin always sees its negotiated channel count
//! - channel pointer arrays for both directions
//!
//! # Pattern
//!
//! 1. Allocate once during setup (non-real-time)
//! 2. Bind caller buffers at the start of each block (no allocation)
//! 3. Hand the pointer arrays to the plugin
//! 4. Release the bindings once the plugin returns
//!
//! All allocation happens in [`ProcessBuffers::allocate`].

use crate::bus_layout::BusLayout;
use crate::error::RangeError;

/// Host-owned scratch and channel pointer arrays for one plugin.
#[derive(Debug)]
pub struct ProcessBuffers {
    input_scratch: Vec<Vec<f32>>,
    output_scratch: Vec<Vec<f32>>,
    input_ptrs: Vec<*mut f32>,
    output_ptrs: Vec<*mut f32>,
    max_frames: usize,
}

impl ProcessBuffers {
    /// Empty storage with no channels.
    pub fn new() -> Self {
        Self {
            input_scratch: Vec::new(),
            output_scratch: Vec::new(),
            input_ptrs: Vec::new(),
            output_ptrs: Vec::new(),
            max_frames: 0,
        }
    }

    /// Allocate storage for the negotiated layout.
    ///
    /// Should be called during setup (non-real-time).
    pub fn allocate(layout: &BusLayout, max_frames: usize) -> Self {
        let scratch = |channels: usize| -> Vec<Vec<f32>> {
            (0..channels).map(|_| vec![0.0; max_frames]).collect()
        };
        Self {
            input_scratch: scratch(layout.input_channels),
            output_scratch: scratch(layout.output_channels),
            input_ptrs: Vec::with_capacity(layout.input_channels),
            output_ptrs: Vec::with_capacity(layout.output_channels),
            max_frames,
        }
    }

    /// Negotiated input channel count.
    #[inline]
    pub fn input_channels(&self) -> usize {
        self.input_scratch.len()
    }

    /// Negotiated output channel count.
    #[inline]
    pub fn output_channels(&self) -> usize {
        self.output_scratch.len()
    }

    /// Maximum frames per block.
    #[inline]
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Check a frame count against the allocated block size.
    pub fn check_frames(&self, num_samples: usize) -> Result<(), RangeError> {
        RangeError::check(
            "sample count",
            num_samples as i64,
            self.max_frames as i64 + 1,
        )
    }

    /// Copy caller input into scratch and point the input array at it.
    ///
    /// Channels the caller does not supply are silent. Supplying more channels
    /// than were negotiated, or a channel shorter than `num_samples`, is an
    /// error and leaves the bindings empty.
    pub fn bind_inputs<'a, I>(&mut self, inputs: I, num_samples: usize) -> Result<(), RangeError>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        self.check_frames(num_samples)?;
        self.input_ptrs.clear();

        let mut inputs = inputs.into_iter();
        let channels = self.input_scratch.len();
        for scratch in &mut self.input_scratch {
            let frames = &mut scratch[..num_samples];
            match inputs.next() {
                Some(source) => {
                    if source.len() < num_samples {
                        self.input_ptrs.clear();
                        return Err(RangeError::new(
                            "input channel length",
                            source.len() as i64,
                            num_samples as i64,
                        ));
                    }
                    frames.copy_from_slice(&source[..num_samples]);
                }
                None => frames.fill(0.0),
            }
            self.input_ptrs.push(scratch.as_mut_ptr());
        }

        let extra = inputs.count();
        if extra > 0 {
            self.input_ptrs.clear();
            return Err(RangeError::new(
                "input channels",
                (channels + extra) as i64,
                channels as i64 + 1,
            ));
        }
        Ok(())
    }

    /// Point the output array at caller buffers, falling back to scratch for
    /// channels the caller does not supply. Every bound channel is zeroed for
    /// `num_samples` frames.
    ///
    /// The bindings borrow from `outputs` without a lifetime; they must only
    /// be dereferenced while `outputs` is still borrowed by the caller, and
    /// [`release`](Self::release) must be called before it is released.
    pub fn bind_outputs<'a, I>(&mut self, outputs: I, num_samples: usize) -> Result<(), RangeError>
    where
        I: IntoIterator<Item = &'a mut [f32]>,
    {
        self.check_frames(num_samples)?;
        self.output_ptrs.clear();

        let channels = self.output_scratch.len();
        let mut supplied = 0;
        for output in outputs {
            if supplied == channels {
                self.output_ptrs.clear();
                return Err(RangeError::new(
                    "output channels",
                    (channels + 1) as i64,
                    channels as i64 + 1,
                ));
            }
            if output.len() < num_samples {
                self.output_ptrs.clear();
                return Err(RangeError::new(
                    "output channel length",
                    output.len() as i64,
                    num_samples as i64,
                ));
            }
            output[..num_samples].fill(0.0);
            self.output_ptrs.push(output.as_mut_ptr());
            supplied += 1;
        }

        for scratch in &mut self.output_scratch[supplied..] {
            scratch[..num_samples].fill(0.0);
            self.output_ptrs.push(scratch.as_mut_ptr());
        }
        Ok(())
    }

    /// Input channel pointer array, `num_input_ptrs()` entries long.
    #[inline]
    pub fn input_ptrs(&mut self) -> *mut *mut f32 {
        self.input_ptrs.as_mut_ptr()
    }

    /// Output channel pointer array, `num_output_ptrs()` entries long.
    #[inline]
    pub fn output_ptrs(&mut self) -> *mut *mut f32 {
        self.output_ptrs.as_mut_ptr()
    }

    /// Number of bound input channels.
    #[inline]
    pub fn num_input_ptrs(&self) -> usize {
        self.input_ptrs.len()
    }

    /// Number of bound output channels.
    #[inline]
    pub fn num_output_ptrs(&self) -> usize {
        self.output_ptrs.len()
    }

    /// Scratch backing an output channel.
    #[cfg(test)]
    fn output_scratch(&self, channel: usize) -> &[f32] {
        &self.output_scratch[channel]
    }

    /// Forget every binding. O(1), keeps capacity.
    #[inline]
    pub fn release(&mut self) {
        self.input_ptrs.clear();
        self.output_ptrs.clear();
    }
}

impl Default for ProcessBuffers {
    fn default() -> Self {
        Self::new()
    }
}
