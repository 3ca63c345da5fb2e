//! Recalls: the effect units attached to a node.
//!
//! A [`Recall`] is either a [`RecallTemplate`], the stateless blueprint a node
//! keeps in its *play* or *recall* list, or a [`RecallInstance`], the per
//! [`RecallId`] duplicate that actually runs. What a recall does is supplied by
//! a [`RecallBehavior`] implementation; the engine drives its hooks through
//! the lifecycle in [`lifecycle`].

pub mod builtin;
pub mod lifecycle;

use core::fmt;

pub use lifecycle::{
    CancelToken, InitState, RecallId, RecallIdState, RunState, Stage, Transition,
};

use crate::automation::Automation;
use crate::channel::Channel;
use crate::container::{ContainerId, RangeSnapshot};
use crate::flags::{RecallKind, RecallKinds};
use crate::recycling::{Recycling, RecyclingArena, RecyclingId};
use crate::render::Renderer;

/// Identifier of a template on its node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(pub(crate) u32);

impl TemplateId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }

    pub(crate) const fn sentinel() -> Self {
        Self(u32::MAX)
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TemplateId({})", self.0)
    }
}

/// Identifier of an instance on its node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub(crate) u32);

impl InstanceId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

/// Whether a template acts on the node as a whole or per channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RecallScope {
    /// Node-level aggregate; never duplicated, receives `automate` calls.
    Audio,
    /// Duplicated once per recall id.
    #[default]
    Channel,
}

impl RecallScope {
    /// Lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Channel => "channel",
        }
    }

    /// Parses `"audio"` or `"channel"`.
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Audio, Self::Channel]
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }
}

/// The two recall lists of a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RecallList {
    /// Used by ids bound to a root container.
    #[default]
    Play,
    /// Used by ids bound to a child container.
    Recall,
}

impl RecallList {
    /// Lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Recall => "recall",
        }
    }

    /// Parses `"play"` or `"recall"`.
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Play, Self::Recall]
            .into_iter()
            .find(|l| l.name().eq_ignore_ascii_case(name))
    }
}

/// Lifecycle state of one instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    /// Created by duplicate.
    Duplicated,
    /// Dependencies looked up.
    Resolved,
    /// The given init stage ran.
    Initialized(Stage),
    /// Ran at least one tick stage.
    Running,
    /// Cancelled; detached at the end of the next stage.
    Cancelled,
}

/// Returned from [`RecallBehavior::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunStatus {
    /// Keep running.
    #[default]
    Continue,
    /// Finished; the instance is detached after the current stage.
    Done,
}

/// What a recall does.
///
/// A template holds one behavior value; `duplicate` produces the value each
/// instance owns. All hooks run under the node lock.
pub trait RecallBehavior: Send {
    /// Name used for dependency lookup among sibling instances.
    fn name(&self) -> &'static str;

    /// Fresh copy for a new instance.
    fn duplicate(&self) -> Box<dyn RecallBehavior>;

    /// Names of sibling recalls that must run before this one.
    fn dependencies(&self) -> &[&'static str] {
        &[]
    }

    /// Init hook, called once per init stage.
    fn init(&mut self, _ctx: &InitContext) {}

    /// Tick hook, called once per stage of every tick.
    fn run(&mut self, _ctx: &mut RunContext<'_>) -> RunStatus {
        RunStatus::Continue
    }

    /// Called on audio-scope templates at the Pre stage of every tick.
    ///
    /// Ticks are per recall id, so a template shared by several ids is
    /// called once for each of them; `ctx.recall_id` tells them apart.
    fn automate(&mut self, _ctx: &AutomateContext<'_>) {}

    /// Called when the owning id is cancelled.
    fn cancel(&mut self) {}

    /// Called when the instance is detached.
    fn on_remove(&mut self) {}
}

/// Passed to [`RecallBehavior::init`].
#[derive(Clone, Copy, Debug)]
pub struct InitContext {
    /// Id being initialized.
    pub recall_id: RecallId,
    /// Context kind of the instance.
    pub kind: RecallKind,
    /// Stage being run.
    pub stage: Stage,
    /// Channel the id is anchored on.
    pub anchor: Channel,
}

/// Passed to [`RecallBehavior::automate`].
#[derive(Clone, Copy, Debug)]
pub struct AutomateContext<'a> {
    /// Id whose tick is starting.
    pub recall_id: RecallId,
    /// Kinds shared by the template and the id.
    pub kinds: RecallKinds,
    /// Tick number being started, counting from 1.
    pub tick: u64,
    /// Automation lanes of the node.
    pub automation: &'a [Automation],
}

impl AutomateContext<'_> {
    /// Value of `control` on `audio_channel` at the tick being started.
    ///
    /// Tick 1 reads position 0. `None` if the lane is missing or empty.
    pub fn value(&self, audio_channel: usize, control: &str) -> Option<f32> {
        let x = u32::try_from(self.tick.saturating_sub(1)).unwrap_or(u32::MAX);
        self.automation
            .iter()
            .find(|a| a.audio_channel == audio_channel && a.control == control)
            .and_then(|a| a.value_at(x))
    }
}

/// Passed to [`RecallBehavior::run`]: the playing range and the render hook.
pub struct RunContext<'a> {
    pub(crate) recall_id: RecallId,
    pub(crate) kind: RecallKind,
    pub(crate) stage: Stage,
    pub(crate) tick: u64,
    pub(crate) anchor: Channel,
    pub(crate) range: RangeSnapshot,
    pub(crate) targets: &'a [(Channel, RecyclingId)],
    pub(crate) recyclings: &'a mut RecyclingArena,
    pub(crate) renderer: &'a dyn Renderer,
    pub(crate) cancel: &'a CancelToken,
}

impl RunContext<'_> {
    /// Id being played.
    pub fn recall_id(&self) -> RecallId {
        self.recall_id
    }

    /// Context kind of the running instance.
    pub fn kind(&self) -> RecallKind {
        self.kind
    }

    /// Stage being run.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Current tick number (starts at 1).
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Channel the id is anchored on.
    pub fn anchor(&self) -> &Channel {
        &self.anchor
    }

    /// Container range seen by this stage.
    pub fn range(&self) -> &RangeSnapshot {
        &self.range
    }

    /// Recyclings of the range in pad order.
    pub fn recyclings(&self) -> impl Iterator<Item = RecyclingId> + '_ {
        self.targets.iter().map(|(_, id)| *id)
    }

    /// A recycling of the node.
    pub fn recycling(&self, id: RecyclingId) -> Option<&Recycling> {
        self.recyclings.get(id)
    }

    /// A recycling of the node, mutably.
    pub fn recycling_mut(&mut self, id: RecyclingId) -> Option<&mut Recycling> {
        self.recyclings.get_mut(id)
    }

    /// `true` once the id was cancelled, even while this stage is running.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Hands every recycling of the range to the renderer, checking for
    /// cancellation before each. Returns the number rendered.
    pub fn render(&mut self) -> usize {
        let renderer = self.renderer;
        self.for_each_target(|channel, recycling| {
            let frames = recycling.buffer().len();
            renderer.render(channel, recycling, 0, frames);
        })
    }

    /// Applies `f` to every recycling of the range with the same cancellation
    /// checkpoints as [`render`](Self::render).
    pub fn for_each_recycling(&mut self, mut f: impl FnMut(&mut Recycling)) -> usize {
        self.for_each_target(|_, recycling| f(recycling))
    }

    fn for_each_target(&mut self, mut f: impl FnMut(&Channel, &mut Recycling)) -> usize {
        let mut visited = 0;
        for (channel, id) in self.targets {
            if self.cancel.is_cancelled() {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "render_cancelled: {} after {visited} recyclings",
                    self.recall_id
                );
                break;
            }
            if let Some(recycling) = self.recyclings.get_mut(*id) {
                f(channel, recycling);
                visited += 1;
            }
        }
        visited
    }
}

/// Stateless blueprint kept in a node's recall list.
pub struct RecallTemplate {
    pub(crate) id: TemplateId,
    pub(crate) scope: RecallScope,
    pub(crate) list: RecallList,
    pub(crate) kinds: RecallKinds,
    pub(crate) behavior: Box<dyn RecallBehavior>,
}

impl RecallTemplate {
    /// Channel-scope template in the play list serving every context.
    pub fn new(behavior: impl RecallBehavior + 'static) -> Self {
        Self::from_boxed(Box::new(behavior))
    }

    /// Same as [`new`](Self::new) for an already boxed behavior.
    pub fn from_boxed(behavior: Box<dyn RecallBehavior>) -> Self {
        Self {
            id: TemplateId::sentinel(),
            scope: RecallScope::Channel,
            list: RecallList::Play,
            kinds: RecallKinds::ALL,
            behavior,
        }
    }

    /// Sets the scope.
    pub fn with_scope(mut self, scope: RecallScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the list the template is kept in.
    pub fn with_list(mut self, list: RecallList) -> Self {
        self.list = list;
        self
    }

    /// Sets the contexts served.
    pub fn with_kinds(mut self, kinds: RecallKinds) -> Self {
        self.kinds = kinds;
        self
    }

    /// Id assigned by the node.
    pub fn id(&self) -> TemplateId {
        self.id
    }

    /// Scope.
    pub fn scope(&self) -> RecallScope {
        self.scope
    }

    /// List the template is kept in.
    pub fn list(&self) -> RecallList {
        self.list
    }

    /// Contexts served.
    pub fn kinds(&self) -> RecallKinds {
        self.kinds
    }

    /// Behavior name.
    pub fn name(&self) -> &'static str {
        self.behavior.name()
    }

    pub(crate) fn info(&self) -> TemplateInfo {
        TemplateInfo {
            id: self.id,
            name: self.name(),
            scope: self.scope,
            list: self.list,
            kinds: self.kinds,
        }
    }
}

impl fmt::Debug for RecallTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecallTemplate")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("scope", &self.scope)
            .field("list", &self.list)
            .field("kinds", &self.kinds)
            .finish()
    }
}

/// Per-id duplicate of a channel-scope template.
pub struct RecallInstance {
    pub(crate) id: InstanceId,
    pub(crate) template: TemplateId,
    pub(crate) recall_id: RecallId,
    pub(crate) container: ContainerId,
    pub(crate) kind: RecallKind,
    pub(crate) state: InstanceState,
    pub(crate) hide: bool,
    pub(crate) remove: bool,
    pub(crate) behavior: Box<dyn RecallBehavior>,
    pub(crate) dependencies: Vec<InstanceId>,
    pub(crate) unresolved: Vec<&'static str>,
}

impl RecallInstance {
    /// Instance id.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Template it was duplicated from.
    pub fn template(&self) -> TemplateId {
        self.template
    }

    /// Id the instance is bound to.
    pub fn recall_id(&self) -> RecallId {
        self.recall_id
    }

    /// Container of the bound id.
    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// Context kind.
    pub fn kind(&self) -> RecallKind {
        self.kind
    }

    /// Lifecycle state.
    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Behavior name.
    pub fn name(&self) -> &'static str {
        self.behavior.name()
    }

    /// Initialized through Post, not hidden and not marked for removal.
    pub(crate) fn is_runnable(&self) -> bool {
        !self.hide
            && !self.remove
            && matches!(
                self.state,
                InstanceState::Initialized(Stage::Post) | InstanceState::Running
            )
    }

    pub(crate) fn info(&self) -> InstanceInfo {
        InstanceInfo {
            id: self.id,
            template: self.template,
            recall_id: self.recall_id,
            container: self.container,
            name: self.name(),
            kind: self.kind,
            state: self.state,
            hide: self.hide,
            remove: self.remove,
            dependencies: self.dependencies.clone(),
            unresolved: self.unresolved.clone(),
        }
    }
}

impl fmt::Debug for RecallInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecallInstance")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("recall_id", &self.recall_id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// An entry of a node's recall list.
#[derive(Debug)]
pub enum Recall {
    /// Blueprint.
    Template(RecallTemplate),
    /// Running duplicate.
    Instance(RecallInstance),
}

impl Recall {
    /// Behavior name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Template(t) => t.name(),
            Self::Instance(i) => i.name(),
        }
    }

    /// The template, if this is one.
    pub fn as_template(&self) -> Option<&RecallTemplate> {
        match self {
            Self::Template(t) => Some(t),
            Self::Instance(_) => None,
        }
    }

    /// The instance, if this is one.
    pub fn as_instance(&self) -> Option<&RecallInstance> {
        match self {
            Self::Instance(i) => Some(i),
            Self::Template(_) => None,
        }
    }

    pub(crate) fn as_template_mut(&mut self) -> Option<&mut RecallTemplate> {
        match self {
            Self::Template(t) => Some(t),
            Self::Instance(_) => None,
        }
    }

    pub(crate) fn as_instance_mut(&mut self) -> Option<&mut RecallInstance> {
        match self {
            Self::Instance(i) => Some(i),
            Self::Template(_) => None,
        }
    }
}

/// Snapshot of a template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateInfo {
    /// Template id.
    pub id: TemplateId,
    /// Behavior name.
    pub name: &'static str,
    /// Scope.
    pub scope: RecallScope,
    /// List.
    pub list: RecallList,
    /// Contexts served.
    pub kinds: RecallKinds,
}

/// Snapshot of an instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Instance id.
    pub id: InstanceId,
    /// Template it came from.
    pub template: TemplateId,
    /// Bound id.
    pub recall_id: RecallId,
    /// Container of the bound id.
    pub container: ContainerId,
    /// Behavior name.
    pub name: &'static str,
    /// Context kind.
    pub kind: RecallKind,
    /// Lifecycle state.
    pub state: InstanceState,
    /// Skipped by play.
    pub hide: bool,
    /// Detached at the end of the next stage.
    pub remove: bool,
    /// Resolved sibling dependencies.
    pub dependencies: Vec<InstanceId>,
    /// Dependency names with no sibling.
    pub unresolved: Vec<&'static str>,
}
