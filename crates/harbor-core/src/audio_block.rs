//! Owned channel-major audio.

/// A block of 32-bit float audio stored channel after channel in one
/// contiguous allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    samples: Vec<f32>,
    channels: usize,
    frames: usize,
}

impl AudioBlock {
    /// Silent block of `channels` x `frames`.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            samples: vec![0.0; channels * frames],
            channels,
            frames,
        }
    }

    /// Build a block from per-channel slices. Every channel must have the
    /// same length; returns `None` otherwise.
    pub fn from_channels<C: AsRef<[f32]>>(channels: &[C]) -> Option<Self> {
        let frames = channels.first().map_or(0, |c| c.as_ref().len());
        if channels.iter().any(|c| c.as_ref().len() != frames) {
            return None;
        }
        let mut samples = Vec::with_capacity(channels.len() * frames);
        for channel in channels {
            samples.extend_from_slice(channel.as_ref());
        }
        Some(Self {
            samples,
            channels: channels.len(),
            frames,
        })
    }

    /// Number of channels.
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of frames per channel.
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Total sample count (`channels * frames`).
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the block holds no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// One channel.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        if index >= self.channels {
            return None;
        }
        let start = index * self.frames;
        Some(&self.samples[start..start + self.frames])
    }

    /// One channel, mutably.
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        if index >= self.channels {
            return None;
        }
        let start = index * self.frames;
        Some(&mut self.samples[start..start + self.frames])
    }

    /// Iterate channels in order.
    pub fn iter_channels(&self) -> impl ExactSizeIterator<Item = &[f32]> {
        ChannelIter {
            samples: &self.samples,
            frames: self.frames,
            remaining: self.channels,
        }
    }

    /// Iterate channels mutably in order.
    pub fn iter_channels_mut(&mut self) -> impl ExactSizeIterator<Item = &mut [f32]> {
        ChannelIterMut {
            samples: &mut self.samples,
            frames: self.frames,
            remaining: self.channels,
        }
    }

    /// All samples, channel after channel.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    /// Set every sample to zero.
    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0, |peak, s| peak.max(s.abs()))
    }
}

// `chunks_exact` cannot express zero-frame channels, so the iterators count
// channels explicitly.

struct ChannelIter<'a> {
    samples: &'a [f32],
    frames: usize,
    remaining: usize,
}

impl<'a> Iterator for ChannelIter<'a> {
    type Item = &'a [f32];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let (head, tail) = self.samples.split_at(self.frames);
        self.samples = tail;
        Some(head)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ChannelIter<'_> {}

struct ChannelIterMut<'a> {
    samples: &'a mut [f32],
    frames: usize,
    remaining: usize,
}

impl<'a> Iterator for ChannelIterMut<'a> {
    type Item = &'a mut [f32];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let samples = std::mem::take(&mut self.samples);
        let (head, tail) = samples.split_at_mut(self.frames);
        self.samples = tail;
        Some(head)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ChannelIterMut<'_> {}
