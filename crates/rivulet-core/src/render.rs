//! Boundary to the DSP layer that fills sample buffers.
//!
//! The engine does not synthesize or process audio itself. When a recall asks
//! for rendering, the scheduler hands each recycling of the playing range to
//! the node's [`Renderer`], one at a time, checking for cancellation between
//! recyclings.

use crate::channel::Channel;
use crate::recycling::Recycling;

/// Fills a region of a recycling's buffer.
///
/// Called with the node lock held: the recycling cannot be resized or freed
/// during the call. Implementations must not call mutating methods of the same
/// node; such calls fail with [`GraphError::Busy`](crate::GraphError::Busy).
pub trait Renderer: Send {
    /// Renders `frame_count` frames starting at `frame_offset` into
    /// `recycling`. `channel` is the channel that owns the recycling.
    fn render(
        &self,
        channel: &Channel,
        recycling: &mut Recycling,
        frame_offset: usize,
        frame_count: usize,
    );
}

/// Renderer that writes silence.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silence;

impl Renderer for Silence {
    fn render(
        &self,
        _channel: &Channel,
        recycling: &mut Recycling,
        frame_offset: usize,
        frame_count: usize,
    ) {
        recycling
            .buffer_mut()
            .region_mut(frame_offset, frame_count)
            .fill(0.0);
    }
}

/// Renderer that writes a constant value; handy for exercising signal paths.
#[derive(Clone, Copy, Debug)]
pub struct Constant(pub f32);

impl Renderer for Constant {
    fn render(
        &self,
        _channel: &Channel,
        recycling: &mut Recycling,
        frame_offset: usize,
        frame_count: usize,
    ) {
        recycling
            .buffer_mut()
            .region_mut(frame_offset, frame_count)
            .fill(self.0);
    }
}
