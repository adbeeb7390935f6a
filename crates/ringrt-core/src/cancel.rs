//! Cancellation token for cooperative task cancellation.
//!
//! A task's future can check its token at any `.await` point or loop
//! iteration and bail out with `Err(TaskError::Cancelled)`. Tokens form
//! parent-child trees: cancelling a parent is visible to every
//! descendant, but cancelling a child never affects its parent.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{TaskError, TaskResult};

/// A handle for checking and triggering cooperative cancellation.
#[derive(Clone)]
pub struct CancellationToken {
    inner: CancellationInner,
}

#[derive(Clone)]
enum CancellationInner {
    Owned(Arc<OwnedCancellation>),
    /// Never cancels; used where a token is required but cancellation is
    /// not meaningful (e.g. the root task spawned by `Runtime::block_on`).
    Dummy,
}

struct OwnedCancellation {
    cancelled: AtomicBool,
    parent: Option<CancellationToken>,
}

impl CancellationToken {
    /// Create a new, independent token.
    pub fn new() -> Self {
        Self {
            inner: CancellationInner::Owned(Arc::new(OwnedCancellation {
                cancelled: AtomicBool::new(false),
                parent: None,
            })),
        }
    }

    /// Create a token that never reports cancelled.
    pub fn dummy() -> Self {
        Self {
            inner: CancellationInner::Dummy,
        }
    }

    /// Create a child token linked to this one. Cancelling `self` is
    /// visible through the child; cancelling the child is not visible
    /// through `self`.
    pub fn child(&self) -> Self {
        Self {
            inner: CancellationInner::Owned(Arc::new(OwnedCancellation {
                cancelled: AtomicBool::new(false),
                parent: Some(self.clone()),
            })),
        }
    }

    /// Check whether cancellation was requested, walking the parent chain.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        match &self.inner {
            CancellationInner::Owned(arc) => {
                if arc.cancelled.load(Ordering::Acquire) {
                    return true;
                }
                match &arc.parent {
                    Some(parent) => parent.is_cancelled(),
                    None => false,
                }
            }
            CancellationInner::Dummy => false,
        }
    }

    /// Request cancellation. Only this token's own flag is set; children
    /// observe it through the parent chain on their next check.
    pub fn cancel(&self) {
        if let CancellationInner::Owned(arc) = &self.inner {
            arc.cancelled.store(true, Ordering::Release);
        }
    }

    /// Convenience: `Err(TaskError::Cancelled)` if cancelled, else `Ok(())`.
    #[inline]
    pub fn check(&self) -> TaskResult<()> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_cancellation() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());

        token.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(TaskError::Cancelled)));
    }

    #[test]
    fn child_sees_parent_cancel() {
        let parent = CancellationToken::new();
        let child = parent.child();
        assert!(!child.is_cancelled());

        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn parent_does_not_see_child_cancel() {
        let parent = CancellationToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn deep_hierarchy_propagates() {
        let root = CancellationToken::new();
        let level1 = root.child();
        let level2 = level1.child();
        let level3 = level2.child();

        assert!(!level3.is_cancelled());
        root.cancel();
        assert!(level1.is_cancelled());
        assert!(level2.is_cancelled());
        assert!(level3.is_cancelled());
    }

    #[test]
    fn clone_shares_state() {
        let a = CancellationToken::new();
        let b = a.clone();
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn dummy_never_cancels() {
        let token = CancellationToken::dummy();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(!token.is_cancelled());
    }
}
