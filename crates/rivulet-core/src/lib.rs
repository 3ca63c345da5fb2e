//! Rivulet Core - audio node topology and recall lifecycle engine
//!
//! This crate models a mixing node's input and output channels, the sample
//! buffers ("recyclings") behind them, and the effect units ("recalls") that
//! run on them across independent playback contexts.
//!
//! # Core Abstractions
//!
//! ## Topology
//!
//! - [`AudioNode`] - Owns both channel chains, recyclings, recalls and the node lock
//! - [`Channel`] - Snapshot of one line with its computed orderings and recycling span
//! - [`NodeFlags`] - SYNC / ASYNC linking and which side owns recyclings
//! - [`Topology`] - Snapshot of the whole node shape
//!
//! Resizes (`set_audio_channel_count`, `set_pad_count`, `set_flags`) keep lines
//! dense, keep channel ids stable and re-point every running context at its
//! anchor's new recyclings.
//!
//! ## Playback Contexts
//!
//! - [`ContainerTree`] - Shared, reference-counted containers with versioned ranges
//! - [`RecallId`] - One playback context bound to a container and an anchor channel
//! - [`RecallTemplate`] / [`RecallInstance`] - Blueprint and per-id duplicate ([`Recall`])
//! - [`RecallBehavior`] - What a recall does at each lifecycle hook
//!
//! ## Score and Automation
//!
//! - [`Notation`] / [`Note`] - Per audio channel score, kept with `HAS_SCORE_TRACK`
//! - [`Automation`] - Per audio channel control lanes, read through
//!   [`AutomateContext::value`] when a tick starts
//!
//! ## Rendering
//!
//! - [`Renderer`] - Fills a recycling's buffer; called once per recycling with
//!   cancellation checked in between
//!
//! # Lifecycle
//!
//! ```text
//! add_recall_id → duplicate → resolve → init(Pre, Inter, Post) → tick* → remove
//! ```
//!
//! [`AudioNode::recursive_play_init`] runs the whole prefix for every output
//! channel at once.
//!
//! # Example
//!
//! ```rust
//! use rivulet_core::builtin::RenderRecycling;
//! use rivulet_core::{AudioNode, Direction, NodeFlags, RecallKinds, RecallTemplate};
//!
//! let node = AudioNode::new("drum");
//! node.set_flags(NodeFlags::ASYNC | NodeFlags::INPUT_HAS_OWN_RECYCLING)?;
//! node.set_audio_channel_count(2)?;
//! node.set_pad_count(Direction::Input, 8)?;
//! node.set_pad_count(Direction::Output, 1)?;
//! node.add_recall_template(RecallTemplate::new(RenderRecycling))?;
//!
//! let ids = node.recursive_play_init(RecallKinds::PLAYBACK)?;
//! for &id in &ids {
//!     node.tick(id)?;
//! }
//! for id in ids {
//!     node.remove(id)?;
//! }
//! assert!(!node.is_playing()?);
//! # Ok::<(), rivulet_core::GraphError>(())
//! ```
//!
//! # Logging
//!
//! Enable the `tracing` feature to get `debug!` events for resizes and every
//! lifecycle step, and `warn!` events for unresolved dependencies and
//! out-of-order stages.

pub mod automation;
pub mod buffer;
pub mod channel;
pub mod container;
pub mod error;
pub mod flags;
pub mod node;
pub mod notation;
pub mod recall;
pub mod recycling;
pub mod render;
pub mod scheduler;
mod sync;
pub mod topology;

pub use automation::{Acceleration, Automation};
pub use buffer::SampleBuffer;
pub use channel::{Channel, ChannelId, Direction, LinkPolicy};
pub use container::{ContainerId, ContainerTree, RangeSnapshot, RecyclingRange};
pub use error::GraphError;
pub use flags::{NodeFlags, RecallKind, RecallKinds};
pub use node::{AudioNode, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, NodeId};
pub use notation::{Notation, Note};
pub use recall::{
    AutomateContext, CancelToken, InitContext, InitState, InstanceId, InstanceInfo,
    InstanceState, Recall, RecallBehavior, RecallId, RecallIdState, RecallInstance, RecallList,
    RecallScope, RecallTemplate, RunContext, RunState, RunStatus, Stage, TemplateId,
    TemplateInfo, Transition, builtin,
};
pub use recycling::{Recycling, RecyclingId};
pub use render::{Constant, Renderer, Silence};
pub use topology::{RecyclingInfo, Topology};
