//! Recyclings: the sample-buffer containers owned by channels.
//!
//! Every [`Recycling`] is owned by exactly one channel. Channels that link to
//! another side (SYNC/ASYNC outputs) never store a recycling; their
//! `first_recycling`/`last_recycling` are derived from the owning side when
//! queried, so freeing a recycling cannot leave a dangling alias behind.

use core::fmt;

use crate::buffer::SampleBuffer;
use crate::channel::{ChannelId, Direction};

/// Identifier of a recycling. Assigned sequentially, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecyclingId(pub(crate) u32);

impl RecyclingId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RecyclingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecyclingId({})", self.0)
    }
}

/// A sample buffer owned by one channel.
#[derive(Debug)]
pub struct Recycling {
    id: RecyclingId,
    owner: ChannelId,
    direction: Direction,
    sample_rate: u32,
    buffer: SampleBuffer,
}

impl Recycling {
    /// Identifier of this recycling.
    pub fn id(&self) -> RecyclingId {
        self.id
    }

    /// The channel that owns this recycling.
    pub fn owner(&self) -> ChannelId {
        self.owner
    }

    /// Side of the owning channel.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Sample rate the buffer is rendered at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The audio data.
    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// Mutable audio data.
    pub fn buffer_mut(&mut self) -> &mut SampleBuffer {
        &mut self.buffer
    }
}

/// Arena of recyclings indexed by [`RecyclingId`].
#[derive(Debug, Default)]
pub(crate) struct RecyclingArena {
    slots: Vec<Option<Recycling>>,
    live: usize,
}

impl RecyclingArena {
    pub(crate) fn alloc(
        &mut self,
        owner: ChannelId,
        direction: Direction,
        frames: usize,
        sample_rate: u32,
    ) -> RecyclingId {
        let id = RecyclingId(self.slots.len() as u32);
        self.slots.push(Some(Recycling {
            id,
            owner,
            direction,
            sample_rate,
            buffer: SampleBuffer::new(frames),
        }));
        self.live += 1;
        id
    }

    /// Frees a recycling. Freeing an unknown id is a no-op.
    pub(crate) fn free(&mut self, id: RecyclingId) {
        if let Some(slot) = self.slots.get_mut(id.0 as usize) {
            if slot.take().is_some() {
                self.live -= 1;
            }
        }
    }

    pub(crate) fn get(&self, id: RecyclingId) -> Option<&Recycling> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: RecyclingId) -> Option<&mut Recycling> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Number of live recyclings.
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Recycling> {
        self.slots.iter().flatten()
    }

    pub(crate) fn set_buffer_size(&mut self, frames: usize) {
        for r in self.slots.iter_mut().flatten() {
            r.buffer.resize(frames);
        }
    }

    pub(crate) fn set_sample_rate(&mut self, sample_rate: u32) {
        for r in self.slots.iter_mut().flatten() {
            r.sample_rate = sample_rate;
        }
    }
}
