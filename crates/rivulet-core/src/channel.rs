//! Channel chains.
//!
//! A node's input and output sides are each a dense array of channel records
//! indexed by line, where `line = pad * audio_channels + audio_channel`. The
//! two traversal orders of a chain are computed from that index:
//!
//! - `next`/`prev`: line ± 1 (walks audio channels, then pads)
//! - `next_pad`/`prev_pad`: line ± audio_channels (walks one audio-channel column)
//!
//! Resizing a side is array surgery plus renumbering; a channel keeps its
//! [`ChannelId`] while its line changes.

use core::fmt;

use crate::flags::{NodeFlags, RecallKinds};
use crate::recycling::RecyclingId;

/// Input or output side of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Input side.
    Input,
    /// Output side.
    Output,
}

impl Direction {
    /// Both sides, input first.
    pub const BOTH: [Self; 2] = [Self::Input, Self::Output];

    /// Lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }

    /// Parses `"input"` or `"output"`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::BOTH
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stable identifier of a channel. Survives renumbering; never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub(crate) u32);

impl ChannelId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

/// How channels of one side obtain their recyclings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkPolicy {
    /// Each channel owns one recycling.
    Own,
    /// Output line `L` aliases the recycling of input line `L`.
    Sync,
    /// Output channel of column `C` spans input column `C` from its first pad
    /// to its last pad.
    Async,
    /// No recycling.
    None,
}

impl LinkPolicy {
    /// Policy of `direction` under `flags`.
    pub fn resolve(flags: NodeFlags, direction: Direction) -> Self {
        match direction {
            Direction::Input if flags.contains(NodeFlags::INPUT_HAS_OWN_RECYCLING) => Self::Own,
            Direction::Input => Self::None,
            Direction::Output if flags.contains(NodeFlags::OUTPUT_HAS_OWN_RECYCLING) => Self::Own,
            Direction::Output if flags.contains(NodeFlags::INPUT_HAS_OWN_RECYCLING) => {
                if flags.contains(NodeFlags::SYNC) {
                    Self::Sync
                } else if flags.contains(NodeFlags::ASYNC) {
                    Self::Async
                } else {
                    Self::None
                }
            }
            Direction::Output => Self::None,
        }
    }
}

/// Channel record stored in a side's chain; position in the chain is its line.
#[derive(Debug)]
pub(crate) struct ChannelData {
    pub(crate) id: ChannelId,
    pub(crate) owned: Option<RecyclingId>,
    pub(crate) indicator: RecallKinds,
}

impl ChannelData {
    pub(crate) fn new(id: ChannelId) -> Self {
        Self {
            id,
            owned: None,
            indicator: RecallKinds::NONE,
        }
    }
}

/// Snapshot of one channel with its computed position and recycling span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Channel {
    /// Stable identifier.
    pub id: ChannelId,
    /// Side of the node.
    pub direction: Direction,
    /// Pad index.
    pub pad: usize,
    /// Audio-channel (column) index.
    pub audio_channel: usize,
    /// `pad * audio_channels + audio_channel`.
    pub line: usize,
    /// Number of audio channels of the node when the snapshot was taken.
    pub audio_channels: usize,
    /// Number of pads on this side when the snapshot was taken.
    pub pads: usize,
    /// First recycling, owned or aliased.
    pub first_recycling: Option<RecyclingId>,
    /// Last recycling; differs from `first_recycling` only for ASYNC spans.
    pub last_recycling: Option<RecyclingId>,
    /// `true` if the channel owns `first_recycling`.
    pub owns_recycling: bool,
    /// Playback contexts currently running on this channel.
    pub indicator: RecallKinds,
}

impl Channel {
    fn line_count(&self) -> usize {
        self.pads * self.audio_channels
    }

    /// Line of the following channel (next audio channel, wrapping to the next pad).
    pub fn next(&self) -> Option<usize> {
        let line = self.line + 1;
        (line < self.line_count()).then_some(line)
    }

    /// Line of the preceding channel.
    pub fn prev(&self) -> Option<usize> {
        self.line.checked_sub(1)
    }

    /// Line of the same audio channel on the next pad.
    pub fn next_pad(&self) -> Option<usize> {
        let line = self.line + self.audio_channels;
        (line < self.line_count()).then_some(line)
    }

    /// Line of the same audio channel on the previous pad.
    pub fn prev_pad(&self) -> Option<usize> {
        self.line.checked_sub(self.audio_channels)
    }

    /// Recycling span as a pair, if the channel has one.
    pub fn recycling_span(&self) -> Option<(RecyclingId, RecyclingId)> {
        self.first_recycling.zip(self.last_recycling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(line: usize, audio_channels: usize, pads: usize) -> Channel {
        Channel {
            id: ChannelId(line as u32),
            direction: Direction::Input,
            pad: line / audio_channels,
            audio_channel: line % audio_channels,
            line,
            audio_channels,
            pads,
            first_recycling: None,
            last_recycling: None,
            owns_recycling: false,
            indicator: RecallKinds::NONE,
        }
    }

    #[test]
    fn orderings_are_computed_from_line() {
        // 3 pads x 2 audio channels
        let first = channel(0, 2, 3);
        assert_eq!(first.next(), Some(1));
        assert_eq!(first.prev(), None);
        assert_eq!(first.next_pad(), Some(2));
        assert_eq!(first.prev_pad(), None);

        let last = channel(5, 2, 3);
        assert_eq!(last.next(), None);
        assert_eq!(last.prev(), Some(4));
        assert_eq!(last.next_pad(), None);
        assert_eq!(last.prev_pad(), Some(3));
    }

    #[test]
    fn output_policy_follows_flags() {
        let own_in = NodeFlags::INPUT_HAS_OWN_RECYCLING;
        assert_eq!(
            LinkPolicy::resolve(own_in | NodeFlags::SYNC, Direction::Output),
            LinkPolicy::Sync
        );
        assert_eq!(
            LinkPolicy::resolve(own_in | NodeFlags::ASYNC, Direction::Output),
            LinkPolicy::Async
        );
        assert_eq!(
            LinkPolicy::resolve(NodeFlags::ASYNC, Direction::Output),
            LinkPolicy::None
        );
        assert_eq!(
            LinkPolicy::resolve(
                own_in | NodeFlags::OUTPUT_HAS_OWN_RECYCLING | NodeFlags::SYNC,
                Direction::Output
            ),
            LinkPolicy::Own
        );
        assert_eq!(LinkPolicy::resolve(own_in, Direction::Input), LinkPolicy::Own);
        assert_eq!(
            LinkPolicy::resolve(NodeFlags::NONE, Direction::Input),
            LinkPolicy::None
        );
    }

    #[test]
    fn direction_names() {
        assert_eq!(Direction::from_name("Output"), Some(Direction::Output));
        assert_eq!(Direction::Input.to_string(), "input");
        assert_eq!(Direction::from_name("sideways"), None);
    }
}
