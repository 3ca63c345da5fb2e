//! Error type shared by topology and scheduler operations.

use thiserror::Error;

use crate::channel::Direction;
use crate::container::ContainerId;
use crate::flags::NodeFlags;
use crate::node::NodeId;
use crate::recall::{RecallId, TemplateId};

/// Errors returned by [`AudioNode`](crate::AudioNode) and
/// [`ContainerTree`](crate::ContainerTree) operations.
///
/// Every operation that returns an error leaves the graph unmodified.
/// Redundant lifecycle calls are not errors: they succeed with
/// [`Transition::AlreadyInStage`](crate::Transition::AlreadyInStage).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Out-of-range pad/line, empty kind set, or similar caller mistake.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A resize is already running on the node, or a mutation was attempted
    /// from inside a callback that runs under the node lock.
    #[error("{node} is busy: {reason}")]
    Busy {
        /// Node that rejected the call.
        node: NodeId,
        /// What the node was doing.
        reason: &'static str,
    },

    /// A shrink would drop the channel an active recall id is anchored on.
    #[error("{direction} line {line} anchors active {recall_id}")]
    LineInUse {
        /// Side of the anchored channel.
        direction: Direction,
        /// Current line of the anchored channel.
        line: usize,
        /// The recall id that still runs on it.
        recall_id: RecallId,
    },

    /// `SYNC` and `ASYNC` requested together.
    #[error("conflicting node flags: {0}")]
    ConflictingFlags(NodeFlags),

    /// The recall id is not registered on this node.
    #[error("{0} not found")]
    RecallIdNotFound(RecallId),

    /// The template is not registered on this node.
    #[error("{0} not found")]
    TemplateNotFound(TemplateId),

    /// The container does not exist (never created or already destroyed).
    #[error("{0} not found")]
    ContainerNotFound(ContainerId),

    /// A lifecycle step was called before its prerequisite.
    #[error("{operation} called out of order for {recall_id}")]
    OutOfOrder {
        /// The recall id the step was called for.
        recall_id: RecallId,
        /// The lifecycle step (`"resolve"`, `"init"`, ...).
        operation: &'static str,
    },

    /// Recall dependencies inside one container form a cycle.
    #[error("dependency cycle among recalls of {0}")]
    DependencyCycle(ContainerId),
}
