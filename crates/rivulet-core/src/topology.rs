//! Topology resizer: audio channels, pads, flags and buffer geometry.
//!
//! Every resize validates first and mutates second, so a rejected resize leaves
//! the node untouched. Channels keep their ids across renumbering; only
//! recyclings owned by dropped channels are freed. Once the chains are in
//! their new shape, every recall id's container range is recomputed from its
//! anchor channel, bumping the container generation where it moved.

use crate::buffer::SampleBuffer;
use crate::channel::{Channel, ChannelData, ChannelId, Direction, LinkPolicy};
use crate::container::ContainerTree;
use crate::error::GraphError;
use crate::flags::NodeFlags;
use crate::node::{AudioNode, NodeState};
use crate::notation::Notation;
use crate::recycling::RecyclingId;
use crate::sync::ResizeGuard;

/// Snapshot of a node's shape.
#[derive(Clone, Debug, PartialEq)]
pub struct Topology {
    /// Node name.
    pub name: String,
    /// Mode flags.
    pub flags: NodeFlags,
    /// Audio channels (columns).
    pub audio_channels: usize,
    /// Input pads.
    pub input_pads: usize,
    /// Output pads.
    pub output_pads: usize,
    /// Sample rate of the recyclings.
    pub sample_rate: u32,
    /// Frames per recycling.
    pub buffer_size: usize,
    /// Input channels by line.
    pub input: Vec<Channel>,
    /// Output channels by line.
    pub output: Vec<Channel>,
    /// Live recyclings by id.
    pub recyclings: Vec<RecyclingInfo>,
}

/// A recycling and its position in its column chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecyclingInfo {
    /// Recycling id.
    pub id: RecyclingId,
    /// Owning channel.
    pub owner: ChannelId,
    /// Side of the owner.
    pub direction: Direction,
    /// Line of the owner.
    pub line: usize,
    /// Buffer length in frames.
    pub frames: usize,
    /// Recycling of the owner's previous pad in the same column.
    pub prev: Option<RecyclingId>,
    /// Recycling of the owner's next pad in the same column.
    pub next: Option<RecyclingId>,
}

impl Topology {
    /// Channels of one side by line.
    pub fn channels(&self, direction: Direction) -> &[Channel] {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
        }
    }

    /// Channel at `line`.
    pub fn channel(&self, direction: Direction, line: usize) -> Option<&Channel> {
        self.channels(direction).get(line)
    }

    /// Pads of one side.
    pub fn pads(&self, direction: Direction) -> usize {
        match direction {
            Direction::Input => self.input_pads,
            Direction::Output => self.output_pads,
        }
    }

    /// `pads * audio_channels` of one side.
    pub fn line_count(&self, direction: Direction) -> usize {
        self.pads(direction) * self.audio_channels
    }

    /// Live recyclings.
    pub fn recycling_count(&self) -> usize {
        self.recyclings.len()
    }

    /// Info of one recycling.
    pub fn recycling(&self, id: RecyclingId) -> Option<&RecyclingInfo> {
        self.recyclings.iter().find(|r| r.id == id)
    }

    /// Channels of one audio-channel column in pad order.
    pub fn column(&self, direction: Direction, audio_channel: usize) -> Vec<&Channel> {
        self.channels(direction)
            .iter()
            .filter(|c| c.audio_channel == audio_channel)
            .collect()
    }

    /// Owned recyclings of one column in pad order.
    pub fn recycling_chain(&self, direction: Direction, audio_channel: usize) -> Vec<RecyclingId> {
        self.column(direction, audio_channel)
            .into_iter()
            .filter(|c| c.owns_recycling)
            .filter_map(|c| c.first_recycling)
            .collect()
    }
}

impl NodeState {
    fn new_channel(&mut self, direction: Direction) -> ChannelData {
        let id = self.next_channel_id();
        let mut data = ChannelData::new(id);
        if LinkPolicy::resolve(self.flags, direction) == LinkPolicy::Own {
            data.owned = Some(self.recyclings.alloc(
                id,
                direction,
                self.buffer_size,
                self.sample_rate,
            ));
        }
        data
    }

    fn drop_channel(&mut self, data: ChannelData) {
        if let Some(recycling) = data.owned {
            self.recyclings.free(recycling);
        }
    }

    /// Fails with `ContainerNotFound` if a recall id's container was freed
    /// behind its back; ranges could not be propagated after the resize.
    fn check_containers(&self, tree: &ContainerTree) -> Result<(), GraphError> {
        match self
            .recall_ids
            .values()
            .find(|d| !tree.contains(d.state.container))
        {
            Some(data) => Err(GraphError::ContainerNotFound(data.state.container)),
            None => Ok(()),
        }
    }

    /// Fails with `LineInUse` if an anchor channel would not be kept.
    fn check_anchors(&self, keep: impl Fn(Direction, usize) -> bool) -> Result<(), GraphError> {
        for data in self.recall_ids.values() {
            if let Some((direction, line)) = self.find_channel(data.state.anchor) {
                if !keep(direction, line) {
                    return Err(GraphError::LineInUse {
                        direction,
                        line,
                        recall_id: data.state.id,
                    });
                }
            }
        }
        Ok(())
    }

    fn resize_audio_channels(&mut self, count: usize) {
        let old = self.audio_channels;
        // input side first so its channels get the lower ids
        for direction in Direction::BOTH {
            let pads = self.pads(direction);
            let mut old_slots: Vec<Option<ChannelData>> = std::mem::take(self.chain_mut(direction))
                .into_iter()
                .map(Some)
                .collect();
            let mut chain = Vec::with_capacity(pads * count);
            for pad in 0..pads {
                for audio_channel in 0..count {
                    let kept = if audio_channel < old {
                        old_slots
                            .get_mut(pad * old + audio_channel)
                            .and_then(Option::take)
                    } else {
                        None
                    };
                    let data = match kept {
                        Some(data) => data,
                        None => self.new_channel(direction),
                    };
                    chain.push(data);
                }
            }
            for data in old_slots.into_iter().flatten() {
                self.drop_channel(data);
            }
            *self.chain_mut(direction) = chain;
        }
        self.audio_channels = count;

        if self.flags.contains(NodeFlags::HAS_SCORE_TRACK) {
            self.notation.truncate(count);
            while self.notation.len() < count {
                let audio_channel = self.notation.len();
                self.notation.push(Notation::new(audio_channel));
            }
        }
        self.automation.retain(|a| a.audio_channel < count);
    }

    fn resize_pads(&mut self, direction: Direction, count: usize) {
        let old = self.pads(direction);
        let lines = count * self.audio_channels;
        if count > old {
            for _ in self.chain(direction).len()..lines {
                let data = self.new_channel(direction);
                self.chain_mut(direction).push(data);
            }
        } else {
            let dropped = self.chain_mut(direction).split_off(lines);
            for data in dropped {
                self.drop_channel(data);
            }
        }
        match direction {
            Direction::Input => self.input_pads = count,
            Direction::Output => self.output_pads = count,
        }

        if direction == Direction::Output && count < old {
            for notation in &mut self.notation {
                notation.truncate_pads(count);
            }
        }
    }

    fn apply_flags(&mut self, flags: NodeFlags) {
        let old = self.flags;
        self.flags = flags;

        for direction in Direction::BOTH {
            let owned_before = LinkPolicy::resolve(old, direction) == LinkPolicy::Own;
            let owns = LinkPolicy::resolve(flags, direction) == LinkPolicy::Own;
            if owns && !owned_before {
                for line in 0..self.chain(direction).len() {
                    let id = self.chain(direction)[line].id;
                    let recycling =
                        self.recyclings
                            .alloc(id, direction, self.buffer_size, self.sample_rate);
                    self.chain_mut(direction)[line].owned = Some(recycling);
                }
            } else if !owns && owned_before {
                for line in 0..self.chain(direction).len() {
                    if let Some(recycling) = self.chain_mut(direction)[line].owned.take() {
                        self.recyclings.free(recycling);
                    }
                }
            }
        }

        let score = NodeFlags::HAS_SCORE_TRACK;
        if flags.contains(score) && !old.contains(score) {
            self.notation = (0..self.audio_channels).map(Notation::new).collect();
        } else if !flags.contains(score) {
            self.notation.clear();
        }
    }

    /// Points every recall id's container at its anchor's current recyclings.
    pub(crate) fn propagate_ranges(&self, tree: &ContainerTree) -> Result<(), GraphError> {
        for data in self.recall_ids.values() {
            let span = self
                .find_channel(data.state.anchor)
                .and_then(|(direction, line)| self.recycling_span(direction, line));
            tree.reset_recycling_range(data.state.container, span)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> Topology {
        let views = |direction: Direction| {
            (0..self.chain(direction).len())
                .filter_map(|line| self.channel_view(direction, line))
                .collect::<Vec<_>>()
        };
        let input = views(Direction::Input);
        let output = views(Direction::Output);

        let recyclings = self
            .recyclings
            .iter()
            .filter_map(|r| {
                let (direction, line) = self.find_channel(r.owner())?;
                let chain = self.chain(direction);
                let prev = line
                    .checked_sub(self.audio_channels)
                    .and_then(|l| chain.get(l))
                    .and_then(|c| c.owned);
                let next = chain
                    .get(line + self.audio_channels)
                    .and_then(|c| c.owned);
                Some(RecyclingInfo {
                    id: r.id(),
                    owner: r.owner(),
                    direction,
                    line,
                    frames: r.buffer().len(),
                    prev,
                    next,
                })
            })
            .collect();

        Topology {
            name: self.name.clone(),
            flags: self.flags,
            audio_channels: self.audio_channels,
            input_pads: self.input_pads,
            output_pads: self.output_pads,
            sample_rate: self.sample_rate,
            buffer_size: self.buffer_size,
            input,
            output,
            recyclings,
        }
    }
}

impl AudioNode {
    /// Snapshot of the node's channels and recyclings.
    pub fn topology(&self) -> Result<Topology, GraphError> {
        self.state.read(NodeState::snapshot)
    }

    /// Copy of a recycling's buffer.
    pub fn recycling_buffer(&self, id: RecyclingId) -> Result<SampleBuffer, GraphError> {
        self.state.read(|s| s.recyclings.get(id).map(|r| r.buffer().clone()))?
            .ok_or_else(|| GraphError::InvalidArgument(format!("{id} does not exist")))
    }

    /// Grows or shrinks the number of audio channels on both sides.
    ///
    /// `0` releases every channel and recycling.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Busy`] if another resize is running.
    /// - [`GraphError::LineInUse`] if a dropped column anchors a recall id.
    /// - [`GraphError::ContainerNotFound`] if a recall id's container is gone.
    pub fn set_audio_channel_count(&self, count: usize) -> Result<(), GraphError> {
        let _guard = ResizeGuard::acquire(&self.resizing, self.id)?;
        self.state.write(|s| {
            let old = s.audio_channels;
            if count == old {
                return Ok(());
            }
            s.check_containers(&self.tree)?;
            s.check_anchors(|_, line| old == 0 || line % old < count)?;
            s.resize_audio_channels(count);
            s.propagate_ranges(&self.tree)?;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                "resize_audio_channels: {} {old} -> {count} ({} recyclings)",
                self.id,
                s.recyclings.len()
            );

            Ok(())
        })
    }

    /// Grows or shrinks the number of pads on one side.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Busy`] if another resize is running.
    /// - [`GraphError::LineInUse`] if a dropped pad anchors a recall id.
    /// - [`GraphError::ContainerNotFound`] if a recall id's container is gone.
    pub fn set_pad_count(&self, direction: Direction, count: usize) -> Result<(), GraphError> {
        let _guard = ResizeGuard::acquire(&self.resizing, self.id)?;
        self.state.write(|s| {
            let old = s.pads(direction);
            if count == old {
                return Ok(());
            }
            let audio_channels = s.audio_channels;
            s.check_containers(&self.tree)?;
            s.check_anchors(|d, line| d != direction || line < count * audio_channels)?;
            s.resize_pads(direction, count);
            s.propagate_ranges(&self.tree)?;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                "resize_pads: {} {direction} {old} -> {count} ({} recyclings)",
                self.id,
                s.recyclings.len()
            );

            Ok(())
        })
    }

    /// Sets mode flags, allocating recyclings for a side that becomes owning.
    ///
    /// # Errors
    ///
    /// [`GraphError::ConflictingFlags`] if `SYNC` and `ASYNC` would both be set.
    pub fn set_flags(&self, flags: NodeFlags) -> Result<(), GraphError> {
        self.update_flags(|old| old.union(flags))
    }

    /// Clears mode flags, freeing the recyclings of a side that stops owning.
    pub fn unset_flags(&self, flags: NodeFlags) -> Result<(), GraphError> {
        self.update_flags(|old| old.difference(flags))
    }

    fn update_flags(&self, f: impl FnOnce(NodeFlags) -> NodeFlags) -> Result<(), GraphError> {
        let _guard = ResizeGuard::acquire(&self.resizing, self.id)?;
        self.state.write(|s| {
            let flags = f(s.flags);
            if !flags.is_valid() {
                return Err(GraphError::ConflictingFlags(flags));
            }
            if flags == s.flags {
                return Ok(());
            }
            s.check_containers(&self.tree)?;

            #[cfg(feature = "tracing")]
            tracing::debug!("node_flags: {} {} -> {}", self.id, s.flags, flags);

            s.apply_flags(flags);
            s.propagate_ranges(&self.tree)
        })
    }

    /// Resizes every recycling buffer to `frames`.
    pub fn set_buffer_size(&self, frames: usize) -> Result<(), GraphError> {
        if frames == 0 {
            return Err(GraphError::InvalidArgument(
                "buffer size must be positive".to_string(),
            ));
        }
        let _guard = ResizeGuard::acquire(&self.resizing, self.id)?;
        self.state.write(|s| {
            s.buffer_size = frames;
            s.recyclings.set_buffer_size(frames);
            Ok(())
        })
    }

    /// Sets the sample rate of the node and every recycling.
    pub fn set_sample_rate(&self, sample_rate: u32) -> Result<(), GraphError> {
        if sample_rate == 0 {
            return Err(GraphError::InvalidArgument(
                "sample rate must be positive".to_string(),
            ));
        }
        let _guard = ResizeGuard::acquire(&self.resizing, self.id)?;
        self.state.write(|s| {
            s.sample_rate = sample_rate;
            s.recyclings.set_sample_rate(sample_rate);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense(topology: &Topology) -> bool {
        Direction::BOTH.into_iter().all(|d| {
            let channels = topology.channels(d);
            channels.len() == topology.line_count(d)
                && channels.iter().enumerate().all(|(i, c)| {
                    c.line == i && c.pad * topology.audio_channels + c.audio_channel == i
                })
        })
    }

    #[test]
    fn grow_allocates_owned_recyclings() {
        let node = AudioNode::new("own");
        node.set_flags(NodeFlags::INPUT_HAS_OWN_RECYCLING | NodeFlags::OUTPUT_HAS_OWN_RECYCLING)
            .unwrap();
        node.set_audio_channel_count(2).unwrap();
        node.set_pad_count(Direction::Input, 3).unwrap();
        node.set_pad_count(Direction::Output, 1).unwrap();

        let t = node.topology().unwrap();
        assert!(dense(&t));
        assert_eq!(t.recycling_count(), 8);
        assert!(t.input.iter().all(|c| c.owns_recycling));
        assert_eq!(t.recycling_chain(Direction::Input, 1).len(), 3);
    }

    #[test]
    fn shrink_keeps_channel_ids() {
        let node = AudioNode::new("keep");
        node.set_audio_channel_count(3).unwrap();
        node.set_pad_count(Direction::Input, 2).unwrap();
        let before = node.topology().unwrap();
        node.set_audio_channel_count(2).unwrap();
        let after = node.topology().unwrap();
        assert!(dense(&after));

        // pad 1, audio channel 0 moves from line 3 to line 2
        assert_eq!(before.input[3].id, after.input[2].id);
        assert_eq!(before.input[0].id, after.input[0].id);
    }

    #[test]
    fn zero_releases_everything() {
        let node = AudioNode::new("zero");
        node.set_flags(NodeFlags::INPUT_HAS_OWN_RECYCLING).unwrap();
        node.set_audio_channel_count(2).unwrap();
        node.set_pad_count(Direction::Input, 4).unwrap();
        node.set_audio_channel_count(0).unwrap();
        let t = node.topology().unwrap();
        assert!(t.input.is_empty());
        assert!(t.output.is_empty());
        assert_eq!(t.recycling_count(), 0);
        assert_eq!(t.input_pads, 4);
    }

    #[test]
    fn recycling_chain_links_pads() {
        let node = AudioNode::new("chain");
        node.set_flags(NodeFlags::INPUT_HAS_OWN_RECYCLING).unwrap();
        node.set_audio_channel_count(2).unwrap();
        node.set_pad_count(Direction::Input, 3).unwrap();
        let t = node.topology().unwrap();
        let chain = t.recycling_chain(Direction::Input, 0);
        let first = t.recycling(chain[0]).unwrap();
        let middle = t.recycling(chain[1]).unwrap();
        assert_eq!(first.prev, None);
        assert_eq!(first.next, Some(chain[1]));
        assert_eq!(middle.prev, Some(chain[0]));
        assert_eq!(middle.next, Some(chain[2]));
    }

    #[test]
    fn conflicting_flags_are_rejected() {
        let node = AudioNode::new("flags");
        node.set_flags(NodeFlags::SYNC).unwrap();
        let err = node.set_flags(NodeFlags::ASYNC).unwrap_err();
        assert_eq!(
            err,
            GraphError::ConflictingFlags(NodeFlags::SYNC | NodeFlags::ASYNC)
        );
        assert_eq!(node.topology().unwrap().flags, NodeFlags::SYNC);
    }

    #[test]
    fn buffer_geometry_applies_to_recyclings() {
        let node = AudioNode::new("geometry");
        node.set_flags(NodeFlags::INPUT_HAS_OWN_RECYCLING).unwrap();
        node.set_audio_channel_count(1).unwrap();
        node.set_pad_count(Direction::Input, 2).unwrap();
        node.set_buffer_size(64).unwrap();
        node.set_sample_rate(48_000).unwrap();
        let t = node.topology().unwrap();
        assert_eq!(t.buffer_size, 64);
        assert!(t.recyclings.iter().all(|r| r.frames == 64));
        assert!(node.set_buffer_size(0).is_err());
    }
}
