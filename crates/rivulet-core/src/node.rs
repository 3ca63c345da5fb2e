//! The audio node: channel chains, recyclings, recalls and their lock.
//!
//! [`AudioNode`] is the public handle. All of its state lives in a
//! `NodeState` behind the node's re-entrant lock; the topology operations
//! live in [`topology`](crate::topology) and the recall lifecycle in
//! [`scheduler`](crate::scheduler), both as further `impl AudioNode` blocks.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::channel::{Channel, ChannelData, ChannelId, Direction, LinkPolicy};
use crate::container::{ContainerId, ContainerTree, RecyclingRange};
use crate::error::GraphError;
use crate::flags::{NodeFlags, RecallKinds};
use crate::automation::Automation;
use crate::notation::{Note, Notation};
use crate::recall::lifecycle::RecallIdData;
use crate::recall::{CancelToken, InstanceId, Recall, RecallId, RecallList, TemplateId};
use crate::recycling::{RecyclingArena, RecyclingId};
use crate::render::{Renderer, Silence};
use crate::sync::NodeLock;

/// Sample rate of a new node.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Frames per recycling buffer of a new node.
pub const DEFAULT_BUFFER_SIZE: usize = 512;

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(0);

/// Unique identifier of an audio node.
///
/// Assigned sequentially per process and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Everything guarded by the node lock.
pub(crate) struct NodeState {
    pub(crate) name: String,
    pub(crate) flags: NodeFlags,
    pub(crate) audio_channels: usize,
    pub(crate) input_pads: usize,
    pub(crate) output_pads: usize,
    pub(crate) sample_rate: u32,
    pub(crate) buffer_size: usize,
    pub(crate) input: Vec<ChannelData>,
    pub(crate) output: Vec<ChannelData>,
    pub(crate) recyclings: RecyclingArena,
    pub(crate) notation: Vec<Notation>,
    pub(crate) automation: Vec<Automation>,
    pub(crate) play: Vec<Recall>,
    pub(crate) recall: Vec<Recall>,
    pub(crate) recall_ids: BTreeMap<RecallId, RecallIdData>,
    /// Containers retained by the node itself.
    pub(crate) containers: Vec<ContainerId>,
    pub(crate) renderer: Box<dyn Renderer>,
    next_channel: u32,
    next_template: u32,
    next_instance: u32,
    next_recall_id: u32,
}

impl NodeState {
    fn new(name: String) -> Self {
        Self {
            name,
            flags: NodeFlags::NONE,
            audio_channels: 0,
            input_pads: 0,
            output_pads: 0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            input: Vec::new(),
            output: Vec::new(),
            recyclings: RecyclingArena::default(),
            notation: Vec::new(),
            automation: Vec::new(),
            play: Vec::new(),
            recall: Vec::new(),
            recall_ids: BTreeMap::new(),
            containers: Vec::new(),
            renderer: Box::new(Silence),
            next_channel: 0,
            next_template: 0,
            next_instance: 0,
            next_recall_id: 0,
        }
    }

    pub(crate) fn chain(&self, direction: Direction) -> &[ChannelData] {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
        }
    }

    pub(crate) fn chain_mut(&mut self, direction: Direction) -> &mut Vec<ChannelData> {
        match direction {
            Direction::Input => &mut self.input,
            Direction::Output => &mut self.output,
        }
    }

    pub(crate) fn pads(&self, direction: Direction) -> usize {
        match direction {
            Direction::Input => self.input_pads,
            Direction::Output => self.output_pads,
        }
    }

    pub(crate) fn line_count(&self, direction: Direction) -> usize {
        self.pads(direction) * self.audio_channels
    }

    pub(crate) fn list(&self, list: RecallList) -> &[Recall] {
        match list {
            RecallList::Play => &self.play,
            RecallList::Recall => &self.recall,
        }
    }

    pub(crate) fn list_mut(&mut self, list: RecallList) -> &mut Vec<Recall> {
        match list {
            RecallList::Play => &mut self.play,
            RecallList::Recall => &mut self.recall,
        }
    }

    pub(crate) fn next_channel_id(&mut self) -> ChannelId {
        let id = ChannelId(self.next_channel);
        self.next_channel += 1;
        id
    }

    pub(crate) fn next_template_id(&mut self) -> TemplateId {
        let id = TemplateId(self.next_template);
        self.next_template += 1;
        id
    }

    pub(crate) fn next_instance_id(&mut self) -> InstanceId {
        let id = InstanceId(self.next_instance);
        self.next_instance += 1;
        id
    }

    pub(crate) fn next_recall_id(&mut self) -> RecallId {
        let id = RecallId(self.next_recall_id);
        self.next_recall_id += 1;
        id
    }

    /// Side and current line of a channel.
    pub(crate) fn find_channel(&self, id: ChannelId) -> Option<(Direction, usize)> {
        Direction::BOTH.into_iter().find_map(|direction| {
            self.chain(direction)
                .iter()
                .position(|c| c.id == id)
                .map(|line| (direction, line))
        })
    }

    /// Owned recycling of a channel, if the line exists.
    fn owned(&self, direction: Direction, line: usize) -> Option<RecyclingId> {
        self.chain(direction).get(line).and_then(|c| c.owned)
    }

    /// First and last recycling of a channel, derived from the link policy.
    pub(crate) fn recycling_span(&self, direction: Direction, line: usize) -> Option<RecyclingRange> {
        if line >= self.line_count(direction) {
            return None;
        }
        match LinkPolicy::resolve(self.flags, direction) {
            LinkPolicy::Own => self.owned(direction, line).map(|r| (r, r)),
            LinkPolicy::Sync => self.owned(Direction::Input, line).map(|r| (r, r)),
            LinkPolicy::Async => {
                let audio_channel = line % self.audio_channels;
                let last_pad = self.input_pads.checked_sub(1)?;
                let first = self.owned(Direction::Input, audio_channel)?;
                let last = self.owned(
                    Direction::Input,
                    last_pad * self.audio_channels + audio_channel,
                )?;
                Some((first, last))
            }
            LinkPolicy::None => None,
        }
    }

    pub(crate) fn channel_view(&self, direction: Direction, line: usize) -> Option<Channel> {
        let data = self.chain(direction).get(line)?;
        let span = self.recycling_span(direction, line);
        Some(Channel {
            id: data.id,
            direction,
            pad: line / self.audio_channels,
            audio_channel: line % self.audio_channels,
            line,
            audio_channels: self.audio_channels,
            pads: self.pads(direction),
            first_recycling: span.map(|(first, _)| first),
            last_recycling: span.map(|(_, last)| last),
            owns_recycling: data.owned.is_some(),
            indicator: data.indicator,
        })
    }

    /// Recyclings of `range` in pad order, each with its owning channel.
    ///
    /// Walks the owning side's column from the owner of `first` down the pads
    /// until the owner of `last`.
    pub(crate) fn range_targets(&self, range: RecyclingRange) -> Vec<(Channel, RecyclingId)> {
        let (first, last) = range;
        let Some((direction, start)) = self
            .recyclings
            .get(first)
            .and_then(|r| self.find_channel(r.owner()))
        else {
            return Vec::new();
        };
        let mut targets = Vec::new();
        let mut line = start;
        while let Some(channel) = self.channel_view(direction, line) {
            if let Some(id) = self.owned(direction, line) {
                targets.push((channel, id));
                if id == last {
                    break;
                }
            }
            line += self.audio_channels;
        }
        targets
    }

    /// Recomputes the playback indicator of a channel from the ids anchored on it.
    pub(crate) fn refresh_indicator(&mut self, channel: ChannelId) {
        let kinds = self
            .recall_ids
            .values()
            .filter(|d| d.state.anchor == channel)
            .fold(RecallKinds::NONE, |acc, d| acc.union(d.state.kinds));
        if let Some((direction, line)) = self.find_channel(channel) {
            if let Some(data) = self.chain_mut(direction).get_mut(line) {
                data.indicator = kinds;
            }
        }
    }
}

/// A mixing node with input and output channel chains.
///
/// `AudioNode` is `Send + Sync`; share it across threads with `Arc`. Every
/// operation takes the node's lock for its whole duration.
///
/// # Example
///
/// ```rust
/// use rivulet_core::{AudioNode, Direction, NodeFlags};
///
/// let node = AudioNode::new("mixer");
/// node.set_flags(NodeFlags::SYNC | NodeFlags::INPUT_HAS_OWN_RECYCLING)?;
/// node.set_audio_channel_count(2)?;
/// node.set_pad_count(Direction::Input, 1)?;
/// node.set_pad_count(Direction::Output, 1)?;
///
/// let topology = node.topology()?;
/// assert_eq!(topology.line_count(Direction::Output), 2);
/// assert_eq!(topology.recycling_count(), 2);
/// # Ok::<(), rivulet_core::GraphError>(())
/// ```
pub struct AudioNode {
    pub(crate) id: NodeId,
    pub(crate) state: NodeLock<NodeState>,
    pub(crate) resizing: AtomicBool,
    pub(crate) tree: ContainerTree,
    pub(crate) cancel_tokens: Mutex<HashMap<RecallId, CancelToken>>,
}

impl AudioNode {
    /// Creates an empty node with its own container tree.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_tree(name, ContainerTree::new())
    }

    /// Creates an empty node playing into a shared container tree.
    pub fn with_tree(name: impl Into<String>, tree: ContainerTree) -> Self {
        let id = NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            id,
            state: NodeLock::new(id, NodeState::new(name.into())),
            resizing: AtomicBool::new(false),
            tree,
            cancel_tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Node identifier.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The container tree this node plays into.
    pub fn tree(&self) -> &ContainerTree {
        &self.tree
    }

    /// Node name.
    pub fn name(&self) -> Result<String, GraphError> {
        self.state.read(|s| s.name.clone())
    }

    /// Replaces the renderer used by render recalls.
    pub fn set_renderer(&self, renderer: impl Renderer + 'static) -> Result<(), GraphError> {
        self.state.write(|s| {
            s.renderer = Box::new(renderer);
            Ok(())
        })
    }

    /// Adds a note to the notation of `audio_channel`.
    ///
    /// Requires [`NodeFlags::HAS_SCORE_TRACK`].
    pub fn add_note(&self, audio_channel: usize, note: Note) -> Result<(), GraphError> {
        self.state.write(|s| {
            if !s.flags.contains(NodeFlags::HAS_SCORE_TRACK) {
                return Err(GraphError::InvalidArgument(
                    "node has no score track".to_string(),
                ));
            }
            let notation = s.notation.get_mut(audio_channel).ok_or_else(|| {
                GraphError::InvalidArgument(format!(
                    "audio channel {audio_channel} out of range"
                ))
            })?;
            notation.add(note);
            Ok(())
        })
    }

    /// Removes one note equal to `note` from `audio_channel`.
    ///
    /// Returns `false` if the notation holds no such note.
    pub fn remove_note(&self, audio_channel: usize, note: Note) -> Result<bool, GraphError> {
        self.state.write(|s| {
            let notation = s.notation.get_mut(audio_channel).ok_or_else(|| {
                GraphError::InvalidArgument(format!(
                    "no notation on audio channel {audio_channel}"
                ))
            })?;
            Ok(notation.remove(note))
        })
    }

    /// Notation per audio channel; empty without a score track.
    pub fn notation(&self) -> Result<Vec<Notation>, GraphError> {
        self.state.read(|s| s.notation.clone())
    }

    /// Adds an automation lane, replacing the lane of the same control on
    /// the same audio channel.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the audio channel is out of range or the
    /// control name is empty.
    pub fn add_automation(&self, automation: Automation) -> Result<(), GraphError> {
        self.state.write(|s| {
            if automation.audio_channel >= s.audio_channels {
                return Err(GraphError::InvalidArgument(format!(
                    "audio channel {} out of range",
                    automation.audio_channel
                )));
            }
            if automation.control.is_empty() {
                return Err(GraphError::InvalidArgument(
                    "automation needs a control name".to_string(),
                ));
            }
            match s.automation.iter_mut().find(|a| {
                a.audio_channel == automation.audio_channel && a.control == automation.control
            }) {
                Some(lane) => *lane = automation,
                None => s.automation.push(automation),
            }
            Ok(())
        })
    }

    /// Removes the lane of `control` on `audio_channel`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if no such lane exists.
    pub fn remove_automation(&self, audio_channel: usize, control: &str) -> Result<(), GraphError> {
        self.state.write(|s| {
            let at = s
                .automation
                .iter()
                .position(|a| a.audio_channel == audio_channel && a.control == control)
                .ok_or_else(|| {
                    GraphError::InvalidArgument(format!(
                        "no automation of {control} on audio channel {audio_channel}"
                    ))
                })?;
            s.automation.remove(at);
            Ok(())
        })
    }

    /// Looks up the lane of `control` on `audio_channel`.
    pub fn find_automation(
        &self,
        audio_channel: usize,
        control: &str,
    ) -> Result<Option<Automation>, GraphError> {
        self.state.read(|s| {
            s.automation
                .iter()
                .find(|a| a.audio_channel == audio_channel && a.control == control)
                .cloned()
        })
    }

    /// Every automation lane in insertion order.
    pub fn automation(&self) -> Result<Vec<Automation>, GraphError> {
        self.state.read(|s| s.automation.clone())
    }
}

impl Drop for AudioNode {
    fn drop(&mut self) {
        // hand back the references held by recall ids and by the node itself
        let held: Vec<ContainerId> = self
            .state
            .read(|s| {
                s.recall_ids
                    .values()
                    .map(|d| d.state.container)
                    .chain(s.containers.iter().copied())
                    .collect()
            })
            .unwrap_or_default();
        for container in held {
            let _ = self.tree.release(container);
        }
    }
}

impl fmt::Debug for AudioNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioNode").field("id", &self.id).finish_non_exhaustive()
    }
}
