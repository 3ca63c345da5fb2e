//! Recycling container tree.
//!
//! A container records which recycling range a playback context reads and
//! writes. Containers form a tree: a root container selects the node's *play*
//! list, a child container its *recall* list. The tree is an arena shared by
//! every node that plays into it; all access goes through one mutex, always
//! taken after the node lock.
//!
//! Each container is reference counted (the creator, every
//! [`RecallId`](crate::RecallId) bound to it, and node retention via
//! [`AudioNode::add_recall_container`](crate::AudioNode::add_recall_container)).
//! It is destroyed when its count reaches zero and it has no children; a parent
//! waiting at zero is reaped when its last child goes.
//!
//! Every range change bumps the container's `generation`, so a holder of a
//! [`RangeSnapshot`] can tell when its view went stale.

use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::GraphError;
use crate::recycling::RecyclingId;

/// Identifier of a container. Assigned sequentially, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub(crate) u32);

impl ContainerId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerId({})", self.0)
    }
}

/// Inclusive recycling range `[first, last]`.
pub type RecyclingRange = (RecyclingId, RecyclingId);

/// A container's range as observed at one point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeSnapshot {
    /// The container observed.
    pub container: ContainerId,
    /// Its range, `None` if it spans no recycling.
    pub range: Option<RecyclingRange>,
    /// Generation of the range when observed.
    pub generation: u64,
}

#[derive(Debug)]
struct ContainerData {
    parent: Option<ContainerId>,
    children: Vec<ContainerId>,
    ref_count: usize,
    range: Option<RecyclingRange>,
    generation: u64,
}

#[derive(Debug, Default)]
struct TreeArena {
    slots: Vec<Option<ContainerData>>,
    live: usize,
}

impl TreeArena {
    fn get(&self, id: ContainerId) -> Result<&ContainerData, GraphError> {
        self.slots
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(GraphError::ContainerNotFound(id))
    }

    fn get_mut(&mut self, id: ContainerId) -> Result<&mut ContainerData, GraphError> {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(GraphError::ContainerNotFound(id))
    }

    fn insert(&mut self, parent: Option<ContainerId>) -> ContainerId {
        let id = ContainerId(self.slots.len() as u32);
        self.slots.push(Some(ContainerData {
            parent,
            children: Vec::new(),
            ref_count: 1,
            range: None,
            generation: 0,
        }));
        self.live += 1;
        id
    }

    /// Destroys `id` if unreferenced and childless, then walks up the parents.
    fn reap(&mut self, mut id: ContainerId) {
        loop {
            let Some(slot) = self.slots.get_mut(id.0 as usize) else {
                return;
            };
            let Some(data) = slot.as_ref() else {
                return;
            };
            if data.ref_count > 0 || !data.children.is_empty() {
                return;
            }
            let parent = data.parent;
            *slot = None;
            self.live -= 1;

            #[cfg(feature = "tracing")]
            tracing::debug!("container_destroy: {id}");

            let Some(parent) = parent else {
                return;
            };
            if let Some(Some(p)) = self.slots.get_mut(parent.0 as usize) {
                p.children.retain(|c| *c != id);
            }
            id = parent;
        }
    }
}

/// Shared arena of recycling containers.
///
/// Cloning is cheap and yields a handle to the same tree.
#[derive(Clone, Debug, Default)]
pub struct ContainerTree {
    inner: Arc<Mutex<TreeArena>>,
}

impl ContainerTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a root container holding one reference for the caller.
    pub fn create_root(&self) -> ContainerId {
        let id = self.inner.lock().insert(None);

        #[cfg(feature = "tracing")]
        tracing::debug!("container_create: root {id}");

        id
    }

    /// Creates a child of `parent` holding one reference for the caller.
    pub fn create_child(&self, parent: ContainerId) -> Result<ContainerId, GraphError> {
        let mut arena = self.inner.lock();
        arena.get(parent)?;
        let id = arena.insert(Some(parent));
        arena.get_mut(parent)?.children.push(id);

        #[cfg(feature = "tracing")]
        tracing::debug!("container_create: {id} under {parent}");

        Ok(id)
    }

    /// Replaces the container's range, bumping its generation if it changed.
    ///
    /// Returns the same id: ranges are updated in place and staleness is
    /// signalled through the generation.
    pub fn reset_recycling_range(
        &self,
        id: ContainerId,
        range: Option<RecyclingRange>,
    ) -> Result<ContainerId, GraphError> {
        let mut arena = self.inner.lock();
        let data = arena.get_mut(id)?;
        if data.range != range {
            data.range = range;
            data.generation += 1;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                "container_range: {id} -> {range:?} (generation {})",
                data.generation
            );
        }
        Ok(id)
    }

    /// Adds a reference.
    pub fn retain(&self, id: ContainerId) -> Result<(), GraphError> {
        self.inner.lock().get_mut(id)?.ref_count += 1;
        Ok(())
    }

    /// Drops a reference; destroys the container (and any parent left
    /// unreferenced and childless) when nothing holds it any more.
    pub fn release(&self, id: ContainerId) -> Result<(), GraphError> {
        let mut arena = self.inner.lock();
        let data = arena.get_mut(id)?;
        if data.ref_count == 0 {
            return Err(GraphError::InvalidArgument(format!(
                "{id} has no reference to release"
            )));
        }
        data.ref_count -= 1;
        arena.reap(id);
        Ok(())
    }

    /// Current range.
    pub fn range(&self, id: ContainerId) -> Result<Option<RecyclingRange>, GraphError> {
        Ok(self.inner.lock().get(id)?.range)
    }

    /// Range together with its generation.
    pub fn snapshot(&self, id: ContainerId) -> Result<RangeSnapshot, GraphError> {
        let arena = self.inner.lock();
        let data = arena.get(id)?;
        Ok(RangeSnapshot {
            container: id,
            range: data.range,
            generation: data.generation,
        })
    }

    /// `false` once the container's range changed (or it was destroyed) since
    /// `snapshot` was taken.
    pub fn is_current(&self, snapshot: &RangeSnapshot) -> bool {
        self.inner
            .lock()
            .get(snapshot.container)
            .is_ok_and(|d| d.generation == snapshot.generation)
    }

    /// Parent container, `None` for a root.
    pub fn parent(&self, id: ContainerId) -> Result<Option<ContainerId>, GraphError> {
        Ok(self.inner.lock().get(id)?.parent)
    }

    /// Child containers in creation order.
    pub fn children(&self, id: ContainerId) -> Result<Vec<ContainerId>, GraphError> {
        Ok(self.inner.lock().get(id)?.children.clone())
    }

    /// Number of references held.
    pub fn ref_count(&self, id: ContainerId) -> Result<usize, GraphError> {
        Ok(self.inner.lock().get(id)?.ref_count)
    }

    /// `true` if the container has no parent.
    pub fn is_root(&self, id: ContainerId) -> Result<bool, GraphError> {
        Ok(self.inner.lock().get(id)?.parent.is_none())
    }

    /// `true` if the container exists.
    pub fn contains(&self, id: ContainerId) -> bool {
        self.inner.lock().get(id).is_ok()
    }

    /// Number of live containers.
    pub fn len(&self) -> usize {
        self.inner.lock().live
    }

    /// `true` if no container is alive.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_destroys_at_zero() {
        let tree = ContainerTree::new();
        let root = tree.create_root();
        tree.retain(root).unwrap();
        assert_eq!(tree.ref_count(root).unwrap(), 2);
        tree.release(root).unwrap();
        assert!(tree.contains(root));
        tree.release(root).unwrap();
        assert!(!tree.contains(root));
        assert_eq!(
            tree.release(root),
            Err(GraphError::ContainerNotFound(root))
        );
    }

    #[test]
    fn parent_waits_for_children() {
        let tree = ContainerTree::new();
        let root = tree.create_root();
        let child = tree.create_child(root).unwrap();
        assert!(tree.is_root(root).unwrap());
        assert!(!tree.is_root(child).unwrap());
        assert_eq!(tree.parent(child).unwrap(), Some(root));
        assert_eq!(tree.children(root).unwrap(), vec![child]);

        tree.release(root).unwrap();
        assert!(tree.contains(root), "root still has a child");

        tree.release(child).unwrap();
        assert!(!tree.contains(child));
        assert!(!tree.contains(root), "unreferenced parent reaped");
        assert!(tree.is_empty());
    }

    #[test]
    fn child_of_missing_parent() {
        let tree = ContainerTree::new();
        assert_eq!(
            tree.create_child(ContainerId(9)),
            Err(GraphError::ContainerNotFound(ContainerId(9)))
        );
    }

    #[test]
    fn generation_bumps_only_on_change() {
        let tree = ContainerTree::new();
        let id = tree.create_root();
        let before = tree.snapshot(id).unwrap();
        assert_eq!(before.range, None);

        let range = (RecyclingId(0), RecyclingId(2));
        assert_eq!(tree.reset_recycling_range(id, Some(range)).unwrap(), id);
        assert!(!tree.is_current(&before));

        let after = tree.snapshot(id).unwrap();
        assert_eq!(after.generation, before.generation + 1);
        tree.reset_recycling_range(id, Some(range)).unwrap();
        assert!(tree.is_current(&after));
        assert_eq!(tree.range(id).unwrap(), Some(range));
    }

    #[test]
    fn destroyed_snapshot_is_stale() {
        let tree = ContainerTree::new();
        let id = tree.create_root();
        let snap = tree.snapshot(id).unwrap();
        tree.release(id).unwrap();
        assert!(!tree.is_current(&snap));
    }
}
