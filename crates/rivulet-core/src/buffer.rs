//! Sample storage carried by a [`Recycling`](crate::Recycling).
//!
//! A [`SampleBuffer`] is one mono block of `f32` frames. The render layer fills
//! or accumulates into a region of it; recalls may post-process it in place.

/// A mono block of audio frames.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
}

impl SampleBuffer {
    /// Creates a new zeroed buffer with the given number of frames.
    pub fn new(frames: usize) -> Self {
        Self {
            samples: vec![0.0; frames],
        }
    }

    /// Fills the buffer with zeros.
    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }

    /// Resizes the buffer, zeroing new frames.
    pub fn resize(&mut self, frames: usize) {
        self.samples.resize(frames, 0.0);
    }

    /// Returns the number of frames.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the buffer has zero length.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Read access to all frames.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Write access to all frames.
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Returns the frames `offset..offset + count`, clamped to the buffer length.
    pub fn region_mut(&mut self, offset: usize, count: usize) -> &mut [f32] {
        let start = offset.min(self.samples.len());
        let end = offset.saturating_add(count).min(self.samples.len());
        &mut self.samples[start..end]
    }

    /// Copies contents from another buffer of the same length.
    pub fn copy_from(&mut self, other: &SampleBuffer) {
        self.samples.copy_from_slice(&other.samples);
    }

    /// Adds another buffer's contents sample-by-sample (mix/accumulate).
    pub fn accumulate_from(&mut self, other: &SampleBuffer) {
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }
    }

    /// Multiplies every frame by `gain`.
    pub fn scale(&mut self, gain: f32) {
        for s in &mut self.samples {
            *s *= gain;
        }
    }

    /// Peak absolute amplitude.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}
