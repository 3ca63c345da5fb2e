//! Bit-set types for node modes and playback context kinds.
//!
//! - [`NodeFlags`] — how an [`AudioNode`](crate::AudioNode) links its output
//!   channels to its input channels and which side owns recyclings.
//! - [`RecallKinds`] — the playback contexts a recall template serves, a
//!   [`RecallId`](crate::RecallId) runs in, or a channel's playback indicator shows.
//! - [`RecallKind`] — exactly one context, carried by a duplicated instance.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

/// Mode flags of an audio node.
///
/// `SYNC` and `ASYNC` are mutually exclusive; the two `*_HAS_OWN_RECYCLING`
/// flags are independent.
///
/// # Example
///
/// ```rust
/// use rivulet_core::NodeFlags;
///
/// let flags = NodeFlags::ASYNC | NodeFlags::INPUT_HAS_OWN_RECYCLING;
/// assert!(flags.contains(NodeFlags::ASYNC));
/// assert!(!flags.contains(NodeFlags::SYNC));
/// assert!(flags.is_valid());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeFlags(u8);

impl NodeFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Output line `L` aliases input line `L`.
    pub const SYNC: Self = Self(1 << 0);
    /// Output channel of column `C` spans every input pad of column `C`.
    pub const ASYNC: Self = Self(1 << 1);
    /// Input channels allocate their own recyclings.
    pub const INPUT_HAS_OWN_RECYCLING: Self = Self(1 << 2);
    /// Output channels allocate their own recyclings.
    pub const OUTPUT_HAS_OWN_RECYCLING: Self = Self(1 << 3);
    /// The node keeps one notation per audio channel.
    pub const HAS_SCORE_TRACK: Self = Self(1 << 4);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::SYNC, "sync"),
        (Self::ASYNC, "async"),
        (Self::INPUT_HAS_OWN_RECYCLING, "input_has_own_recycling"),
        (Self::OUTPUT_HAS_OWN_RECYCLING, "output_has_own_recycling"),
        (Self::HAS_SCORE_TRACK, "has_score_track"),
    ];

    /// Returns the raw bits.
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any bit of `other` is set in `self`.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the union of two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `self` with every bit of `other` cleared.
    #[inline]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Returns `true` if no flag is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `false` if both `SYNC` and `ASYNC` are set.
    #[inline]
    pub const fn is_valid(self) -> bool {
        !self.contains(Self::SYNC.union(Self::ASYNC))
    }

    /// Looks up a single flag by its lowercase name (e.g. `"async"`).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(f, _)| *f)
    }

    /// Returns the lowercase names of all set flags.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(f, _)| self.contains(*f))
            .map(|(_, n)| *n)
            .collect()
    }
}

impl BitOr for NodeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for NodeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for NodeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeFlags({})", self.names().join(" | "))
    }
}

impl fmt::Display for NodeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.names().join(" | "))
    }
}

/// A single playback context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecallKind {
    /// Plain playback of the node's signal.
    Playback,
    /// Pattern sequencer pass.
    Sequencer,
    /// Notation/score pass.
    Notation,
}

impl RecallKind {
    /// All kinds in priority order.
    pub const ALL: [Self; 3] = [Self::Playback, Self::Sequencer, Self::Notation];

    /// Returns the one-bit [`RecallKinds`] set for this kind.
    pub const fn as_kinds(self) -> RecallKinds {
        match self {
            Self::Playback => RecallKinds::PLAYBACK,
            Self::Sequencer => RecallKinds::SEQUENCER,
            Self::Notation => RecallKinds::NOTATION,
        }
    }

    /// Lowercase name, as used in node descriptions.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Playback => "playback",
            Self::Sequencer => "sequencer",
            Self::Notation => "notation",
        }
    }

    /// Parses a lowercase kind name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for RecallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of playback contexts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RecallKinds(u8);

impl RecallKinds {
    /// Empty set.
    pub const NONE: Self = Self(0);
    /// Plain playback.
    pub const PLAYBACK: Self = Self(1 << 0);
    /// Sequencer.
    pub const SEQUENCER: Self = Self(1 << 1);
    /// Notation.
    pub const NOTATION: Self = Self(1 << 2);
    /// All three contexts.
    pub const ALL: Self = Self(0b111);

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if the two sets share a context.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the union of two sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns the intersection of two sets.
    #[inline]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Returns `self` with every context of `other` removed.
    #[inline]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Returns `true` if no context is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Highest-priority kind in the set (playback, then sequencer, then notation).
    pub fn primary(self) -> Option<RecallKind> {
        RecallKind::ALL
            .into_iter()
            .find(|k| self.contains(k.as_kinds()))
    }

    /// Iterates the kinds in the set in priority order.
    pub fn iter(self) -> impl Iterator<Item = RecallKind> {
        RecallKind::ALL
            .into_iter()
            .filter(move |k| self.contains(k.as_kinds()))
    }
}

impl From<RecallKind> for RecallKinds {
    fn from(kind: RecallKind) -> Self {
        kind.as_kinds()
    }
}

impl FromIterator<RecallKind> for RecallKinds {
    fn from_iter<I: IntoIterator<Item = RecallKind>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::NONE, |acc, k| acc.union(k.as_kinds()))
    }
}

impl BitOr for RecallKinds {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for RecallKinds {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for RecallKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(RecallKind::name).collect();
        write!(f, "RecallKinds({})", names.join(" | "))
    }
}
