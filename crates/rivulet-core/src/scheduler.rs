//! Playback scheduler: the recall lifecycle driven per [`RecallId`].
//!
//! ```text
//! add_recall_id ─► duplicate ─► resolve ─► init(Pre, Inter, Post) ─► play(Pre, Inter, Post)* ─► remove
//!                                                                       │
//!                                                               cancel ─┘
//! ```
//!
//! Every step holds the node lock for its whole duration, so steps of
//! different ids never interleave on one node. Cancellation is the one
//! exception: the id's [`CancelToken`] is set *before* the lock is taken, which
//! lets a render running on another thread stop at its next recycling.

use std::collections::VecDeque;

use crate::channel::{Channel, Direction};
use crate::container::ContainerId;
use crate::error::GraphError;
use crate::flags::RecallKinds;
use crate::node::{AudioNode, NodeState};
use crate::recall::lifecycle::RecallIdData;
use crate::recall::{
    AutomateContext, CancelToken, InitContext, InitState, InstanceId, InstanceInfo,
    InstanceState, Recall, RecallId, RecallIdState, RecallInstance, RecallList, RecallScope,
    RecallTemplate, RunContext, RunState, RunStatus, Stage, TemplateId, TemplateInfo, Transition,
};

fn instance_mut(recalls: &mut [Recall], id: InstanceId) -> Option<&mut RecallInstance> {
    recalls
        .iter_mut()
        .filter_map(Recall::as_instance_mut)
        .find(|i| i.id == id)
}

/// Removes and returns every instance matching `pred`, keeping list order.
fn detach(
    recalls: &mut Vec<Recall>,
    pred: impl Fn(&RecallInstance) -> bool,
) -> Vec<RecallInstance> {
    let mut detached = Vec::new();
    let mut i = 0;
    while i < recalls.len() {
        if recalls[i].as_instance().is_some_and(&pred) {
            if let Recall::Instance(instance) = recalls.remove(i) {
                detached.push(instance);
            }
        } else {
            i += 1;
        }
    }
    detached
}

/// Orders instances so that dependencies come first (Kahn's algorithm).
///
/// Dependencies on instances outside `entries` impose no order. Returns `None`
/// on a cycle. Independent instances keep their relative order.
fn dependency_order(entries: &[(InstanceId, Vec<InstanceId>)]) -> Option<Vec<InstanceId>> {
    let n = entries.len();
    let mut in_degree = vec![0u32; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, (_, deps)) in entries.iter().enumerate() {
        for dep in deps {
            if let Some(d) = entries.iter().position(|(id, _)| id == dep) {
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted = Vec::with_capacity(n);

    while let Some(idx) = queue.pop_front() {
        sorted.push(entries[idx].0);
        for &next in &dependents[idx] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    (sorted.len() == n).then_some(sorted)
}

impl NodeState {
    fn data(&self, id: RecallId) -> Result<&RecallIdData, GraphError> {
        self.recall_ids
            .get(&id)
            .ok_or(GraphError::RecallIdNotFound(id))
    }

    fn data_mut(&mut self, id: RecallId) -> Result<&mut RecallIdData, GraphError> {
        self.recall_ids
            .get_mut(&id)
            .ok_or(GraphError::RecallIdNotFound(id))
    }

    fn anchor_view(&self, id: RecallId) -> Result<Channel, GraphError> {
        let anchor = self.data(id)?.state.anchor;
        self.find_channel(anchor)
            .and_then(|(direction, line)| self.channel_view(direction, line))
            .ok_or_else(|| GraphError::InvalidArgument(format!("anchor of {id} is gone")))
    }

    fn instances_of(&self, id: RecallId) -> impl Iterator<Item = &RecallInstance> {
        self.play
            .iter()
            .chain(self.recall.iter())
            .filter_map(Recall::as_instance)
            .filter(move |i| i.recall_id == id)
    }

    fn duplicate(&mut self, id: RecallId) -> Result<usize, GraphError> {
        let data = self.data(id)?;
        let (list, kinds, container) = (data.list, data.state.kinds, data.state.container);

        let recalls = self.list(list);
        let mut pending = Vec::new();
        for template in recalls.iter().filter_map(Recall::as_template) {
            if template.scope != RecallScope::Channel {
                continue;
            }
            let Some(kind) = template.kinds.intersection(kinds).primary() else {
                continue;
            };
            let exists = recalls
                .iter()
                .filter_map(Recall::as_instance)
                .any(|i| i.template == template.id && i.recall_id == id);
            if !exists {
                pending.push((template.id, kind, template.behavior.duplicate()));
            }
        }

        let created = pending.len();
        for (template, kind, behavior) in pending {
            let instance = RecallInstance {
                id: self.next_instance_id(),
                template,
                recall_id: id,
                container,
                kind,
                state: InstanceState::Duplicated,
                hide: false,
                remove: false,
                behavior,
                dependencies: Vec::new(),
                unresolved: Vec::new(),
            };
            self.list_mut(list).push(Recall::Instance(instance));
        }

        let data = self.data_mut(id)?;
        data.state.duplicated = true;
        if created > 0 && data.state.resolved {
            // new instances are not in the execution order yet
            data.state.resolved = false;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("duplicate: {id} created {created} instances in {} list", list.name());

        Ok(created)
    }

    /// Resolves every instance of the id's container against its siblings.
    ///
    /// The execution order covers the id's own instances. Instances that join
    /// an id whose init already started are brought up to the same init stage
    /// here, so nothing plays without its init hooks.
    fn resolve(&mut self, id: RecallId) -> Result<Transition, GraphError> {
        let data = self.data(id)?;
        if data.state.resolved {
            return Ok(Transition::AlreadyInStage);
        }
        if !data.state.duplicated {
            return Err(GraphError::OutOfOrder {
                recall_id: id,
                operation: "resolve",
            });
        }
        let (list, container, init) = (data.list, data.state.container, data.state.init);

        let siblings: Vec<(InstanceId, &'static str)> = self
            .list(list)
            .iter()
            .filter_map(Recall::as_instance)
            .filter(|i| i.container == container)
            .map(|i| (i.id, i.name()))
            .collect();

        let mut resolved = Vec::new();
        for instance in self
            .list(list)
            .iter()
            .filter_map(Recall::as_instance)
            .filter(|i| i.container == container)
        {
            let mut deps = Vec::new();
            let mut unresolved = Vec::new();
            for name in instance.behavior.dependencies() {
                let before = deps.len();
                deps.extend(
                    siblings
                        .iter()
                        .filter(|(sid, sname)| *sid != instance.id && sname == name)
                        .map(|(sid, _)| *sid),
                );
                if deps.len() == before {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "resolve: {} of {id} depends on missing recall '{name}'",
                        instance.name()
                    );
                    unresolved.push(*name);
                }
            }
            resolved.push((instance.id, instance.recall_id, deps, unresolved));
        }

        let edges: Vec<(InstanceId, Vec<InstanceId>)> = resolved
            .iter()
            .filter(|(_, owner, _, _)| *owner == id)
            .map(|(iid, _, deps, _)| (*iid, deps.clone()))
            .collect();
        let order = dependency_order(&edges).ok_or(GraphError::DependencyCycle(container))?;

        let recalls = self.list_mut(list);
        for (iid, _, deps, unresolved) in resolved {
            if let Some(instance) = instance_mut(recalls, iid) {
                instance.dependencies = deps;
                instance.unresolved = unresolved;
                if instance.state == InstanceState::Duplicated {
                    instance.state = InstanceState::Resolved;
                }
            }
        }

        let late: Vec<InstanceId> = order
            .iter()
            .copied()
            .filter(|iid| {
                self.list(list)
                    .iter()
                    .filter_map(Recall::as_instance)
                    .any(|i| i.id == *iid && i.state == InstanceState::Resolved)
            })
            .collect();
        if init != InitState::NotInitialized && !late.is_empty() {
            let anchor = self.anchor_view(id)?;
            for stage in Stage::ALL.into_iter().filter(|st| InitState::after(*st) <= init) {
                self.init_instances(list, id, stage, anchor, &late);
            }

            #[cfg(feature = "tracing")]
            tracing::debug!("resolve: {id} caught up {} instances to {init:?}", late.len());
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("resolve: {id} order {order:?}");

        let data = self.data_mut(id)?;
        data.order = order;
        data.state.resolved = true;
        Ok(Transition::Applied)
    }

    fn init_instances(
        &mut self,
        list: RecallList,
        id: RecallId,
        stage: Stage,
        anchor: Channel,
        instances: &[InstanceId],
    ) {
        let recalls = self.list_mut(list);
        for &iid in instances {
            let Some(instance) = instance_mut(recalls, iid) else {
                continue;
            };
            if instance.state == InstanceState::Cancelled {
                continue;
            }
            if stage == Stage::Pre {
                instance.hide = false;
                instance.remove = false;
            }
            let ctx = InitContext {
                recall_id: id,
                kind: instance.kind,
                stage,
                anchor,
            };
            instance.behavior.init(&ctx);
            instance.state = InstanceState::Initialized(stage);
        }
    }

    fn init(&mut self, stage: Stage, id: RecallId) -> Result<Transition, GraphError> {
        let data = self.data(id)?;
        if !data.state.resolved {
            return Err(GraphError::OutOfOrder {
                recall_id: id,
                operation: "init",
            });
        }
        match data.state.init_transition(stage) {
            Transition::Applied => {}
            Transition::AlreadyInStage => return Ok(Transition::AlreadyInStage),
            _ => {
                return Err(GraphError::OutOfOrder {
                    recall_id: id,
                    operation: "init",
                });
            }
        }
        let list = data.list;
        let order = data.order.clone();
        let anchor = self.anchor_view(id)?;
        self.init_instances(list, id, stage, anchor, &order);

        #[cfg(feature = "tracing")]
        tracing::debug!("init: {id} stage {stage}");

        self.data_mut(id)?.state.init = InitState::after(stage);
        Ok(Transition::Applied)
    }

    fn cancel_instances(&mut self, id: RecallId) -> Result<usize, GraphError> {
        let list = self.data(id)?.list;
        let mut cancelled = 0;
        for instance in self
            .list_mut(list)
            .iter_mut()
            .filter_map(Recall::as_instance_mut)
            .filter(|i| i.recall_id == id && i.state != InstanceState::Cancelled)
        {
            instance.state = InstanceState::Cancelled;
            instance.remove = true;
            instance.behavior.cancel();
            cancelled += 1;
        }
        Ok(cancelled)
    }
}

impl AudioNode {
    fn register_recall_id(
        &self,
        s: &mut NodeState,
        kinds: RecallKinds,
        container: ContainerId,
        direction: Direction,
        line: usize,
    ) -> Result<RecallId, GraphError> {
        if kinds.is_empty() {
            return Err(GraphError::InvalidArgument("empty kind set".to_string()));
        }
        let anchor = s.chain(direction).get(line).map(|c| c.id).ok_or_else(|| {
            GraphError::InvalidArgument(format!("{direction} line {line} out of range"))
        })?;
        if let Some(other) = s.recall_ids.values().find(|d| d.state.container == container) {
            return Err(GraphError::InvalidArgument(format!(
                "{container} already plays {}",
                other.state.id
            )));
        }
        let list = if self.tree.is_root(container)? {
            RecallList::Play
        } else {
            RecallList::Recall
        };
        self.tree.retain(container)?;
        self.tree
            .reset_recycling_range(container, s.recycling_span(direction, line))?;

        let id = s.next_recall_id();
        let cancel = CancelToken::default();
        s.recall_ids.insert(
            id,
            RecallIdData {
                state: RecallIdState {
                    id,
                    container,
                    anchor,
                    anchor_direction: direction,
                    kinds,
                    duplicated: false,
                    resolved: false,
                    init: InitState::NotInitialized,
                    run: RunState::Idle,
                    tick: 0,
                },
                order: Vec::new(),
                cancel: cancel.clone(),
                list,
            },
        );
        s.refresh_indicator(anchor);
        self.cancel_tokens.lock().insert(id, cancel);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "add_recall_id: {id} on {} {direction} line {line} via {container} ({kinds:?})",
            self.id
        );

        Ok(id)
    }

    fn play_stage(
        &self,
        s: &mut NodeState,
        id: RecallId,
        stage: Stage,
    ) -> Result<Transition, GraphError> {
        let data = s.data(id)?;
        match data.state.run_transition(stage) {
            Transition::Applied => {}
            Transition::OutOfOrder => {
                #[cfg(feature = "tracing")]
                tracing::warn!("play: {id} stage {stage} out of order after {:?}", data.state.run);
                return Ok(Transition::OutOfOrder);
            }
            other => return Ok(other),
        }
        let list = data.list;
        let kinds = data.state.kinds;
        let container = data.state.container;
        let cancel = data.cancel.clone();
        let order = data.order.clone();
        let tick = if stage == Stage::Pre {
            data.state.tick + 1
        } else {
            data.state.tick
        };
        let anchor = s.anchor_view(id)?;

        if stage == Stage::Pre {
            let NodeState {
                play,
                recall,
                automation,
                ..
            } = &mut *s;
            let templates = match list {
                RecallList::Play => play,
                RecallList::Recall => recall,
            };
            for template in templates
                .iter_mut()
                .filter_map(Recall::as_template_mut)
                .filter(|t| t.scope == RecallScope::Audio)
            {
                let shared = template.kinds.intersection(kinds);
                if !shared.is_empty() {
                    template.behavior.automate(&AutomateContext {
                        recall_id: id,
                        kinds: shared,
                        tick,
                        automation: automation.as_slice(),
                    });
                }
            }
        }

        let range = self.tree.snapshot(container)?;
        let targets = range
            .range
            .map(|r| s.range_targets(r))
            .unwrap_or_default();

        let NodeState {
            play,
            recall,
            recyclings,
            renderer,
            ..
        } = &mut *s;
        let recalls = match list {
            RecallList::Play => play,
            RecallList::Recall => recall,
        };
        for iid in &order {
            let Some(instance) = instance_mut(recalls, *iid) else {
                continue;
            };
            if !instance.is_runnable() {
                continue;
            }
            let mut ctx = RunContext {
                recall_id: id,
                kind: instance.kind,
                stage,
                tick,
                anchor,
                range,
                targets: &targets,
                recyclings: &mut *recyclings,
                renderer: &**renderer,
                cancel: &cancel,
            };
            instance.state = InstanceState::Running;
            if instance.behavior.run(&mut ctx) == RunStatus::Done {
                instance.remove = true;
            }
        }

        let mut detached = detach(recalls, |i| i.recall_id == id && i.remove);
        for instance in &mut detached {
            instance.behavior.on_remove();
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "play: {id} tick {tick} stage {stage} over {} recyclings, {} detached",
            targets.len(),
            detached.len()
        );

        let data = s.data_mut(id)?;
        data.state.run = RunState::after(stage);
        data.state.tick = tick;
        data.order.retain(|iid| detached.iter().all(|d| d.id != *iid));
        Ok(Transition::Applied)
    }

    fn remove_locked(&self, s: &mut NodeState, id: RecallId) -> Result<(), GraphError> {
        let data = s.data(id)?;
        let (list, container, anchor) = (data.list, data.state.container, data.state.anchor);

        for mut instance in detach(s.list_mut(list), |i| i.recall_id == id) {
            instance.behavior.on_remove();
        }
        s.recall_ids.remove(&id);
        s.refresh_indicator(anchor);
        self.cancel_tokens.lock().remove(&id);

        // the id is gone even if its container was released elsewhere
        let released = self.tree.release(container);

        #[cfg(feature = "tracing")]
        match &released {
            Ok(()) => tracing::debug!("remove: {id} from {}", self.id),
            Err(err) => tracing::warn!("remove: {id} from {}: {err}", self.id),
        }

        released
    }

    fn play_init_locked(
        &self,
        s: &mut NodeState,
        kinds: RecallKinds,
        ids: &mut Vec<RecallId>,
    ) -> Result<(), GraphError> {
        for line in 0..s.line_count(Direction::Output) {
            let root = self.tree.create_root();
            let registered = self.register_recall_id(s, kinds, root, Direction::Output, line);
            // the id holds the only reference from here on
            self.tree.release(root)?;
            let id = registered?;
            ids.push(id);
            s.duplicate(id)?;
            s.resolve(id)?;
        }
        for stage in Stage::ALL {
            for &id in ids.iter() {
                s.init(stage, id)?;
            }
        }
        Ok(())
    }

    /// Creates a recall id bound to `container` and anchored on a channel.
    ///
    /// The id takes a reference on the container and points its range at the
    /// anchor's recyclings. A root container selects the play list, a child
    /// container the recall list.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidArgument`] for an empty kind set, a line out of
    /// range, or a container another id of this node already plays through.
    pub fn add_recall_id(
        &self,
        kinds: RecallKinds,
        container: ContainerId,
        direction: Direction,
        line: usize,
    ) -> Result<RecallId, GraphError> {
        self.state
            .write(|s| self.register_recall_id(s, kinds, container, direction, line))
    }

    /// Duplicates every matching channel-scope template for `id`.
    ///
    /// Returns the number of instances created; templates that already have an
    /// instance for `id` are skipped, so repeated calls create nothing new.
    pub fn duplicate(&self, id: RecallId) -> Result<usize, GraphError> {
        self.state.write(|s| s.duplicate(id))
    }

    /// Resolves dependencies of `id`'s instances and fixes their execution order.
    ///
    /// # Errors
    ///
    /// - [`GraphError::OutOfOrder`] before [`duplicate`](Self::duplicate).
    /// - [`GraphError::DependencyCycle`] if dependencies form a cycle; the id
    ///   stays unresolved.
    pub fn resolve(&self, id: RecallId) -> Result<Transition, GraphError> {
        self.state.write(|s| s.resolve(id))
    }

    /// Runs one init stage for `id`.
    ///
    /// # Errors
    ///
    /// [`GraphError::OutOfOrder`] before resolve or before the previous stage.
    pub fn init(&self, stage: Stage, id: RecallId) -> Result<Transition, GraphError> {
        self.state.write(|s| s.init(stage, id))
    }

    /// Runs one stage of a tick for `id`.
    ///
    /// Before init completed this renders nothing and returns
    /// [`Transition::NotReady`]. Repeating the current stage returns
    /// [`Transition::AlreadyInStage`]; a stage that does not follow the current
    /// one returns [`Transition::OutOfOrder`]. Neither runs anything.
    pub fn play(&self, id: RecallId, stage: Stage) -> Result<Transition, GraphError> {
        self.state.write(|s| self.play_stage(s, id, stage))
    }

    /// Runs Pre, Inter and Post for `id`, stopping at the first stage that
    /// does not apply.
    pub fn tick(&self, id: RecallId) -> Result<Transition, GraphError> {
        self.state.write(|s| {
            for stage in Stage::ALL {
                let transition = self.play_stage(s, id, stage)?;
                if transition != Transition::Applied {
                    return Ok(transition);
                }
            }
            Ok(Transition::Applied)
        })
    }

    /// Cancels `id`.
    ///
    /// The cancellation token is set before the node lock is taken, so a render
    /// in flight stops at its next recycling. Then every bound instance is
    /// marked cancelled and detached at the end of the next stage.
    pub fn cancel(&self, id: RecallId) -> Result<(), GraphError> {
        let token = self
            .cancel_tokens
            .lock()
            .get(&id)
            .cloned()
            .ok_or(GraphError::RecallIdNotFound(id))?;
        token.cancel();

        self.state.write(|s| {
            let cancelled = s.cancel_instances(id)?;

            #[cfg(feature = "tracing")]
            tracing::debug!("cancel: {id} ({cancelled} instances)");
            #[cfg(not(feature = "tracing"))]
            let _ = cancelled;

            Ok(())
        })
    }

    /// Detaches every instance of `id`, drops the id and releases its
    /// container reference.
    ///
    /// # Errors
    ///
    /// [`GraphError::ContainerNotFound`] if the container was already freed;
    /// the id is removed regardless.
    pub fn remove(&self, id: RecallId) -> Result<(), GraphError> {
        self.state.write(|s| self.remove_locked(s, id))
    }

    /// Starts a pass on every output channel.
    ///
    /// For each output line: a root container spanning the channel's
    /// recyclings and an id anchored on it, duplicated and resolved. Then init
    /// Pre runs for all ids, then Inter, then Post. On error every id created
    /// so far is removed again.
    pub fn recursive_play_init(&self, kinds: RecallKinds) -> Result<Vec<RecallId>, GraphError> {
        if kinds.is_empty() {
            return Err(GraphError::InvalidArgument("empty kind set".to_string()));
        }
        self.state.write(|s| {
            let mut ids = Vec::new();
            if let Err(err) = self.play_init_locked(s, kinds, &mut ids) {
                for id in ids {
                    let _ = self.remove_locked(s, id);
                }
                return Err(err);
            }

            #[cfg(feature = "tracing")]
            tracing::debug!("recursive_play_init: {} started {} ids", self.id, ids.len());

            Ok(ids)
        })
    }

    /// `true` if any channel, input or output, shows a running playback context.
    pub fn is_playing(&self) -> Result<bool, GraphError> {
        self.state.read(|s| {
            s.input
                .iter()
                .chain(s.output.iter())
                .any(|c| !c.indicator.is_empty())
        })
    }

    /// Adds a template to the list it names.
    pub fn add_recall_template(&self, mut template: RecallTemplate) -> Result<TemplateId, GraphError> {
        if template.kinds.is_empty() {
            return Err(GraphError::InvalidArgument(format!(
                "template '{}' serves no context",
                template.name()
            )));
        }
        self.state.write(|s| {
            let id = s.next_template_id();
            template.id = id;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                "add_recall_template: {id} '{}' ({} scope, {} list)",
                template.name(),
                template.scope.name(),
                template.list.name()
            );

            s.list_mut(template.list).push(Recall::Template(template));
            Ok(id)
        })
    }

    /// Removes a template. Instances already duplicated from it keep running.
    pub fn remove_recall_template(&self, id: TemplateId) -> Result<(), GraphError> {
        self.state.write(|s| {
            for list in [RecallList::Play, RecallList::Recall] {
                let recalls = s.list_mut(list);
                if let Some(pos) = recalls
                    .iter()
                    .position(|r| r.as_template().is_some_and(|t| t.id == id))
                {
                    recalls.remove(pos);
                    return Ok(());
                }
            }
            Err(GraphError::TemplateNotFound(id))
        })
    }

    /// Templates of both lists, play list first.
    pub fn templates(&self) -> Result<Vec<TemplateInfo>, GraphError> {
        self.state.read(|s| {
            s.play
                .iter()
                .chain(s.recall.iter())
                .filter_map(Recall::as_template)
                .map(RecallTemplate::info)
                .collect()
        })
    }

    /// Instances bound to `id`, in list order. Empty once `id` was removed.
    pub fn instances(&self, id: RecallId) -> Result<Vec<InstanceInfo>, GraphError> {
        self.state
            .read(|s| s.instances_of(id).map(RecallInstance::info).collect())
    }

    /// Execution order fixed by the last resolve.
    pub fn execution_order(&self, id: RecallId) -> Result<Vec<InstanceId>, GraphError> {
        self.state.read(|s| s.data(id).map(|d| d.order.clone()))?
    }

    /// Hides or shows an instance. Hidden instances are skipped by play until
    /// the next init Pre.
    pub fn hide_instance(&self, instance: InstanceId, hide: bool) -> Result<(), GraphError> {
        self.state.write(|s| {
            for list in [RecallList::Play, RecallList::Recall] {
                if let Some(i) = instance_mut(s.list_mut(list), instance) {
                    i.hide = hide;
                    return Ok(());
                }
            }
            Err(GraphError::InvalidArgument(format!("{instance} does not exist")))
        })
    }

    /// Recall ids registered on the node.
    pub fn recall_ids(&self) -> Result<Vec<RecallId>, GraphError> {
        self.state.read(|s| s.recall_ids.keys().copied().collect())
    }

    /// Lifecycle snapshot of `id`.
    pub fn recall_id_state(&self, id: RecallId) -> Result<RecallIdState, GraphError> {
        self.state.read(|s| s.data(id).map(|d| d.state))?
    }

    /// Cancellation token of `id`; readable without the node lock.
    pub fn cancel_token(&self, id: RecallId) -> Result<CancelToken, GraphError> {
        self.cancel_tokens
            .lock()
            .get(&id)
            .cloned()
            .ok_or(GraphError::RecallIdNotFound(id))
    }

    /// `true` if `id` was cancelled. Never blocks on the node lock.
    pub fn is_cancel_requested(&self, id: RecallId) -> bool {
        self.cancel_tokens
            .lock()
            .get(&id)
            .is_some_and(CancelToken::is_cancelled)
    }

    /// Retains `container` on behalf of the node.
    pub fn add_recall_container(&self, container: ContainerId) -> Result<(), GraphError> {
        self.state.write(|s| {
            self.tree.retain(container)?;
            s.containers.push(container);
            Ok(())
        })
    }

    /// Drops the node's reference on `container`.
    pub fn remove_recall_container(&self, container: ContainerId) -> Result<(), GraphError> {
        self.state.write(|s| {
            let pos = s
                .containers
                .iter()
                .position(|c| *c == container)
                .ok_or(GraphError::ContainerNotFound(container))?;
            self.tree.release(container)?;
            s.containers.remove(pos);
            Ok(())
        })
    }

    /// Containers retained by the node.
    pub fn recall_containers(&self) -> Result<Vec<ContainerId>, GraphError> {
        self.state.read(|s| s.containers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::NodeFlags;
    use crate::recall::builtin::{CountTicks, Gain, RenderRecycling};
    use crate::recall::RecallBehavior;
    use crate::render::Constant;

    fn sync_node() -> AudioNode {
        let node = AudioNode::new("sync");
        node.set_flags(NodeFlags::SYNC | NodeFlags::INPUT_HAS_OWN_RECYCLING)
            .unwrap();
        node.set_buffer_size(8).unwrap();
        node.set_audio_channel_count(1).unwrap();
        node.set_pad_count(Direction::Input, 1).unwrap();
        node.set_pad_count(Direction::Output, 1).unwrap();
        node
    }

    #[derive(Clone, Copy)]
    struct Named(&'static str, &'static [&'static str]);

    impl RecallBehavior for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn duplicate(&self) -> Box<dyn RecallBehavior> {
            Box::new(*self)
        }

        fn dependencies(&self) -> &[&'static str] {
            self.1
        }
    }

    fn started(node: &AudioNode) -> RecallId {
        let root = node.tree().create_root();
        let id = node
            .add_recall_id(RecallKinds::PLAYBACK, root, Direction::Output, 0)
            .unwrap();
        node.tree().release(root).unwrap();
        node.duplicate(id).unwrap();
        node.resolve(id).unwrap();
        for stage in Stage::ALL {
            node.init(stage, id).unwrap();
        }
        id
    }

    #[test]
    fn kahn_keeps_independent_order() {
        let a = InstanceId(0);
        let b = InstanceId(1);
        let c = InstanceId(2);
        let order = dependency_order(&[(a, vec![c]), (b, vec![]), (c, vec![])]).unwrap();
        assert_eq!(order, vec![b, c, a]);
        assert!(dependency_order(&[(a, vec![b]), (b, vec![a])]).is_none());
    }

    #[test]
    fn duplicate_is_idempotent() {
        let node = sync_node();
        node.add_recall_template(RecallTemplate::new(RenderRecycling))
            .unwrap();
        node.add_recall_template(
            RecallTemplate::new(Gain::new(0.5)).with_kinds(RecallKinds::SEQUENCER),
        )
        .unwrap();
        let root = node.tree().create_root();
        let id = node
            .add_recall_id(RecallKinds::PLAYBACK, root, Direction::Output, 0)
            .unwrap();
        assert_eq!(node.duplicate(id).unwrap(), 1);
        assert_eq!(node.duplicate(id).unwrap(), 0);
        assert_eq!(node.instances(id).unwrap().len(), 1);
    }

    #[test]
    fn instance_kind_follows_priority() {
        let node = sync_node();
        node.add_recall_template(
            RecallTemplate::new(RenderRecycling)
                .with_kinds(RecallKinds::SEQUENCER | RecallKinds::NOTATION),
        )
        .unwrap();
        let root = node.tree().create_root();
        let id = node
            .add_recall_id(RecallKinds::ALL, root, Direction::Output, 0)
            .unwrap();
        node.duplicate(id).unwrap();
        let instances = node.instances(id).unwrap();
        assert_eq!(instances[0].kind, crate::flags::RecallKind::Sequencer);
    }

    #[test]
    fn audio_scope_is_not_duplicated() {
        let node = sync_node();
        node.add_recall_template(RecallTemplate::new(RenderRecycling).with_scope(RecallScope::Audio))
            .unwrap();
        let root = node.tree().create_root();
        let id = node
            .add_recall_id(RecallKinds::PLAYBACK, root, Direction::Output, 0)
            .unwrap();
        assert_eq!(node.duplicate(id).unwrap(), 0);
    }

    #[test]
    fn child_container_uses_recall_list() {
        let node = sync_node();
        node.add_recall_template(RecallTemplate::new(RenderRecycling))
            .unwrap();
        node.add_recall_template(RecallTemplate::new(Gain::new(2.0)).with_list(RecallList::Recall))
            .unwrap();
        let root = node.tree().create_root();
        let child = node.tree().create_child(root).unwrap();
        let id = node
            .add_recall_id(RecallKinds::PLAYBACK, child, Direction::Output, 0)
            .unwrap();
        node.duplicate(id).unwrap();
        let names: Vec<_> = node.instances(id).unwrap().iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["gain"]);
    }

    #[test]
    fn resolve_orders_dependencies_first() {
        let node = sync_node();
        node.add_recall_template(RecallTemplate::new(Gain::new(0.5)))
            .unwrap();
        node.add_recall_template(RecallTemplate::new(RenderRecycling))
            .unwrap();
        let id = started(&node);
        let order = node.execution_order(id).unwrap();
        let instances = node.instances(id).unwrap();
        let name_of = |iid: InstanceId| instances.iter().find(|i| i.id == iid).unwrap().name;
        let names: Vec<_> = order.into_iter().map(name_of).collect();
        assert_eq!(names, vec!["render", "gain"]);
    }

    #[test]
    fn missing_dependency_is_tolerated() {
        let node = sync_node();
        node.add_recall_template(RecallTemplate::new(Gain::new(0.5)))
            .unwrap();
        let id = started(&node);
        let instances = node.instances(id).unwrap();
        assert_eq!(instances[0].unresolved, vec!["render"]);
        assert_eq!(node.recall_id_state(id).unwrap().init, InitState::InitPost);
    }

    #[test]
    fn cycle_leaves_id_unresolved() {
        let node = sync_node();
        node.add_recall_template(RecallTemplate::new(Named("a", &["b"])))
            .unwrap();
        node.add_recall_template(RecallTemplate::new(Named("b", &["a"])))
            .unwrap();
        let root = node.tree().create_root();
        let id = node
            .add_recall_id(RecallKinds::PLAYBACK, root, Direction::Output, 0)
            .unwrap();
        node.duplicate(id).unwrap();
        assert_eq!(node.resolve(id), Err(GraphError::DependencyCycle(root)));
        assert!(!node.recall_id_state(id).unwrap().resolved);
        assert!(matches!(
            node.init(Stage::Pre, id),
            Err(GraphError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn lifecycle_steps_require_order() {
        let node = sync_node();
        let root = node.tree().create_root();
        let id = node
            .add_recall_id(RecallKinds::PLAYBACK, root, Direction::Output, 0)
            .unwrap();
        assert_eq!(
            node.resolve(id),
            Err(GraphError::OutOfOrder {
                recall_id: id,
                operation: "resolve"
            })
        );
        node.duplicate(id).unwrap();
        assert_eq!(node.resolve(id), Ok(Transition::Applied));
        assert_eq!(node.resolve(id), Ok(Transition::AlreadyInStage));
        assert!(node.init(Stage::Inter, id).is_err());
        assert_eq!(node.init(Stage::Pre, id), Ok(Transition::Applied));
        assert_eq!(node.init(Stage::Pre, id), Ok(Transition::AlreadyInStage));
    }

    #[test]
    fn play_before_init_renders_nothing() {
        let node = sync_node();
        node.set_renderer(Constant(1.0)).unwrap();
        node.add_recall_template(RecallTemplate::new(RenderRecycling))
            .unwrap();
        let root = node.tree().create_root();
        let id = node
            .add_recall_id(RecallKinds::PLAYBACK, root, Direction::Output, 0)
            .unwrap();
        node.duplicate(id).unwrap();
        node.resolve(id).unwrap();
        assert_eq!(node.tick(id), Ok(Transition::NotReady));

        let recycling = node.topology().unwrap().input[0].first_recycling.unwrap();
        assert_eq!(node.recycling_buffer(recycling).unwrap().peak(), 0.0);
        assert_eq!(node.recall_id_state(id).unwrap().tick, 0);
    }

    #[test]
    fn tick_renders_and_applies_gain() {
        let node = sync_node();
        node.set_renderer(Constant(1.0)).unwrap();
        node.add_recall_template(RecallTemplate::new(Gain::new(0.25)))
            .unwrap();
        node.add_recall_template(RecallTemplate::new(RenderRecycling))
            .unwrap();
        let id = started(&node);
        assert_eq!(node.tick(id), Ok(Transition::Applied));

        let recycling = node.topology().unwrap().output[0].first_recycling.unwrap();
        let buffer = node.recycling_buffer(recycling).unwrap();
        assert!(buffer.samples().iter().all(|&s| (s - 0.25).abs() < 1e-6));
        assert_eq!(node.recall_id_state(id).unwrap().tick, 1);
    }

    #[test]
    fn stages_run_in_order() {
        let node = sync_node();
        let id = started(&node);
        assert_eq!(node.play(id, Stage::Inter), Ok(Transition::OutOfOrder));
        assert_eq!(node.play(id, Stage::Pre), Ok(Transition::Applied));
        assert_eq!(node.play(id, Stage::Pre), Ok(Transition::AlreadyInStage));
        assert_eq!(node.play(id, Stage::Post), Ok(Transition::OutOfOrder));
        assert_eq!(node.play(id, Stage::Inter), Ok(Transition::Applied));
        assert_eq!(node.play(id, Stage::Post), Ok(Transition::Applied));
        assert_eq!(node.play(id, Stage::Pre), Ok(Transition::Applied));
        assert_eq!(node.recall_id_state(id).unwrap().tick, 2);
    }

    #[test]
    fn done_instances_are_detached() {
        let node = sync_node();
        node.add_recall_template(RecallTemplate::new(CountTicks::new(2)))
            .unwrap();
        let id = started(&node);
        node.tick(id).unwrap();
        assert_eq!(node.instances(id).unwrap().len(), 1);
        node.tick(id).unwrap();
        assert!(node.instances(id).unwrap().is_empty());
        assert!(node.execution_order(id).unwrap().is_empty());
    }

    #[test]
    fn hidden_instances_are_skipped_until_init() {
        let node = sync_node();
        node.add_recall_template(RecallTemplate::new(CountTicks::new(1)))
            .unwrap();
        let id = started(&node);
        let instance = node.instances(id).unwrap()[0].id;
        node.hide_instance(instance, true).unwrap();
        node.tick(id).unwrap();
        assert_eq!(node.instances(id).unwrap().len(), 1, "hidden instance never ran");
        node.hide_instance(instance, false).unwrap();
        node.tick(id).unwrap();
        assert!(node.instances(id).unwrap().is_empty());
    }

    #[test]
    fn cancel_marks_and_next_stage_detaches() {
        let node = sync_node();
        node.add_recall_template(RecallTemplate::new(RenderRecycling))
            .unwrap();
        let id = started(&node);
        node.cancel(id).unwrap();
        assert!(node.is_cancel_requested(id));
        let instances = node.instances(id).unwrap();
        assert!(instances
            .iter()
            .all(|i| i.state == InstanceState::Cancelled && i.remove));
        node.play(id, Stage::Pre).unwrap();
        assert!(node.instances(id).unwrap().is_empty());
    }

    #[test]
    fn remove_restores_container_count() {
        let node = sync_node();
        node.add_recall_template(RecallTemplate::new(RenderRecycling))
            .unwrap();
        let root = node.tree().create_root();
        let id = node
            .add_recall_id(RecallKinds::PLAYBACK, root, Direction::Output, 0)
            .unwrap();
        assert_eq!(node.tree().ref_count(root).unwrap(), 2);
        assert!(node.is_playing().unwrap());
        node.remove(id).unwrap();
        assert_eq!(node.tree().ref_count(root).unwrap(), 1);
        assert!(!node.is_playing().unwrap());
        assert_eq!(node.remove(id), Err(GraphError::RecallIdNotFound(id)));
        assert!(!node.is_cancel_requested(id));
    }

    #[test]
    fn node_retains_containers() {
        let node = AudioNode::new("retain");
        let root = node.tree().create_root();
        node.add_recall_container(root).unwrap();
        node.tree().release(root).unwrap();
        assert!(node.tree().contains(root));
        assert_eq!(node.recall_containers().unwrap(), vec![root]);
        node.remove_recall_container(root).unwrap();
        assert!(!node.tree().contains(root));
        assert_eq!(
            node.remove_recall_container(root),
            Err(GraphError::ContainerNotFound(root))
        );
    }

    #[test]
    fn template_removal_keeps_instances() {
        let node = sync_node();
        let template = node
            .add_recall_template(RecallTemplate::new(RenderRecycling))
            .unwrap();
        let id = started(&node);
        node.remove_recall_template(template).unwrap();
        assert!(node.templates().unwrap().is_empty());
        assert_eq!(node.instances(id).unwrap().len(), 1);
        assert_eq!(
            node.remove_recall_template(template),
            Err(GraphError::TemplateNotFound(template))
        );
    }

    #[test]
    fn empty_kinds_are_rejected() {
        let node = sync_node();
        assert!(node.recursive_play_init(RecallKinds::NONE).is_err());
        let err = node.add_recall_template(
            RecallTemplate::new(RenderRecycling).with_kinds(RecallKinds::NONE),
        );
        assert!(matches!(err, Err(GraphError::InvalidArgument(_))));
    }
}
