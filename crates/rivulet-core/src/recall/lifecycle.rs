//! Recall id handles and their explicit lifecycle state.
//!
//! A [`RecallId`] moves through
//! `duplicated → resolved → InitPre → InitInter → InitPost`, then cycles
//! `Idle → RunningPre → RunningInter → RunningPost → RunningPre …` once per tick.
//! Transitions are computed here; the scheduler applies them.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::channel::{ChannelId, Direction};
use crate::container::ContainerId;
use crate::flags::RecallKinds;

use super::{InstanceId, RecallList};

/// Handle of one playback context on a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecallId(pub(crate) u32);

impl RecallId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RecallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecallId({})", self.0)
    }
}

/// One of the three phases of init and of every tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Runs first.
    Pre,
    /// Runs second; rendering happens here.
    Inter,
    /// Runs last.
    Post,
}

impl Stage {
    /// Stages in execution order.
    pub const ALL: [Self; 3] = [Self::Pre, Self::Inter, Self::Post];

    /// Lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Inter => "inter",
            Self::Post => "post",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How far init has progressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum InitState {
    /// No init stage done.
    #[default]
    NotInitialized,
    /// Pre done.
    InitPre,
    /// Pre and Inter done.
    InitInter,
    /// All three done; the id may play.
    InitPost,
}

impl InitState {
    /// State reached once `stage` completed.
    pub const fn after(stage: Stage) -> Self {
        match stage {
            Stage::Pre => Self::InitPre,
            Stage::Inter => Self::InitInter,
            Stage::Post => Self::InitPost,
        }
    }
}

/// Which stage of the current tick last ran.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    /// No tick started yet.
    #[default]
    Idle,
    /// Pre of the current tick ran.
    RunningPre,
    /// Inter of the current tick ran.
    RunningInter,
    /// Post of the current tick ran; the next Pre starts a new tick.
    RunningPost,
}

impl RunState {
    /// State reached once `stage` ran.
    pub const fn after(stage: Stage) -> Self {
        match stage {
            Stage::Pre => Self::RunningPre,
            Stage::Inter => Self::RunningInter,
            Stage::Post => Self::RunningPost,
        }
    }
}

/// Outcome of a lifecycle step that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The step ran and advanced the state.
    Applied,
    /// The id was already in (or past) the requested state; nothing ran.
    AlreadyInStage,
    /// The stage does not follow the current one; nothing ran.
    OutOfOrder,
    /// Init is not complete; nothing ran.
    NotReady,
}

/// Snapshot of a recall id's lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecallIdState {
    /// The id.
    pub id: RecallId,
    /// Container the id plays through.
    pub container: ContainerId,
    /// Channel whose recyclings the id spans.
    pub anchor: ChannelId,
    /// Side of the anchor channel.
    pub anchor_direction: Direction,
    /// Playback contexts of the id.
    pub kinds: RecallKinds,
    /// `duplicate` ran.
    pub duplicated: bool,
    /// `resolve` ran.
    pub resolved: bool,
    /// Init progress.
    pub init: InitState,
    /// Tick progress.
    pub run: RunState,
    /// Number of ticks started.
    pub tick: u64,
}

impl RecallIdState {
    pub(crate) fn init_transition(&self, stage: Stage) -> Transition {
        let target = InitState::after(stage);
        if self.init >= target {
            return Transition::AlreadyInStage;
        }
        let previous = match stage {
            Stage::Pre => InitState::NotInitialized,
            Stage::Inter => InitState::InitPre,
            Stage::Post => InitState::InitInter,
        };
        if self.init == previous {
            Transition::Applied
        } else {
            Transition::OutOfOrder
        }
    }

    pub(crate) fn run_transition(&self, stage: Stage) -> Transition {
        if self.init != InitState::InitPost {
            return Transition::NotReady;
        }
        match (self.run, stage) {
            (RunState::Idle | RunState::RunningPost, Stage::Pre)
            | (RunState::RunningPre, Stage::Inter)
            | (RunState::RunningInter, Stage::Post) => Transition::Applied,
            (run, stage) if run == RunState::after(stage) => Transition::AlreadyInStage,
            _ => Transition::OutOfOrder,
        }
    }
}

/// Cancellation flag of a recall id, readable without the node lock.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// `true` once [`AudioNode::cancel`](crate::AudioNode::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Per-id bookkeeping stored on the node.
#[derive(Debug)]
pub(crate) struct RecallIdData {
    pub(crate) state: RecallIdState,
    /// Instances of this id in dependency order, set by resolve.
    pub(crate) order: Vec<InstanceId>,
    pub(crate) cancel: CancelToken,
    /// Play list for a root container, recall list otherwise.
    pub(crate) list: RecallList,
}
