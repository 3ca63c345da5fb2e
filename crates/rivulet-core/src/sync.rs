//! Per-node locking.
//!
//! Each [`AudioNode`](crate::AudioNode) embeds a [`NodeLock`] around its state:
//! a re-entrant mutex so callbacks running under the lock may call back into
//! the node on the same thread, and a `RefCell` so such a call can never alias
//! the state mutably. A conflicting borrow is reported as
//! [`GraphError::Busy`] instead of panicking.
//!
//! Resizes additionally hold a [`ResizeGuard`], taken *before* the lock, so a
//! second resize from any thread fails fast instead of queueing behind the
//! first.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use parking_lot::ReentrantMutex;

use crate::error::GraphError;
use crate::node::NodeId;

pub(crate) struct NodeLock<T> {
    node: NodeId,
    inner: ReentrantMutex<RefCell<T>>,
}

impl<T> NodeLock<T> {
    pub(crate) fn new(node: NodeId, value: T) -> Self {
        Self {
            node,
            inner: ReentrantMutex::new(RefCell::new(value)),
        }
    }

    /// Runs `f` with shared access to the state.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, GraphError> {
        let guard = self.inner.lock();
        let state = guard.try_borrow().map_err(|_| GraphError::Busy {
            node: self.node,
            reason: "read from inside a node callback",
        })?;
        Ok(f(&state))
    }

    /// Runs `f` with exclusive access to the state.
    pub(crate) fn write<R>(
        &self,
        f: impl FnOnce(&mut T) -> Result<R, GraphError>,
    ) -> Result<R, GraphError> {
        let guard = self.inner.lock();
        let mut state = guard.try_borrow_mut().map_err(|_| GraphError::Busy {
            node: self.node,
            reason: "mutation from inside a node callback",
        })?;
        f(&mut state)
    }
}

/// Marks a resize in progress for as long as it lives.
pub(crate) struct ResizeGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ResizeGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool, node: NodeId) -> Result<Self, GraphError> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| GraphError::Busy {
                node,
                reason: "resize in progress",
            })?;
        Ok(Self { flag })
    }
}

impl Drop for ResizeGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_resize_is_busy() {
        let flag = AtomicBool::new(false);
        let guard = ResizeGuard::acquire(&flag, NodeId(1)).unwrap();
        let err = ResizeGuard::acquire(&flag, NodeId(1)).err();
        assert!(matches!(err, Some(GraphError::Busy { .. })));
        drop(guard);
        assert!(ResizeGuard::acquire(&flag, NodeId(1)).is_ok());
    }

    #[test]
    fn nested_write_is_busy() {
        let lock = NodeLock::new(NodeId(2), 0u32);
        let result = lock.write(|value| {
            *value += 1;
            let nested = lock.write(|v| {
                *v += 1;
                Ok(())
            });
            assert!(matches!(nested, Err(GraphError::Busy { .. })));
            let read = lock.read(|v| *v);
            assert!(matches!(read, Err(GraphError::Busy { .. })));
            Ok(*value)
        });
        assert_eq!(result, Ok(1));
        assert_eq!(lock.read(|v| *v), Ok(1));
    }

    #[test]
    fn nested_reads_are_allowed() {
        let lock = NodeLock::new(NodeId(3), 5u32);
        let sum = lock.read(|a| *a + lock.read(|b| *b).unwrap()).unwrap();
        assert_eq!(sum, 10);
    }
}
