use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ringrt_core::SpinLock;

use crate::task::Task;

/// Bounded per-worker ready queue.
///
/// Only the owning worker pops from its own local queue; any worker may
/// push to any local queue (cross-worker wake, work distribution from
/// `spawn`), and any worker may steal half of another's queue.
pub struct LocalQueue {
    queue: SpinLock<VecDeque<Arc<Task>>>,
    len: AtomicUsize,
    capacity: usize,
}

impl LocalQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: SpinLock::new(VecDeque::with_capacity(capacity)),
            len: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Push `item` to the back of the queue.
    ///
    /// If the queue is at capacity, half its current contents (oldest
    /// first) plus `item` are removed and returned as an overflow batch
    /// for the caller to push onto the global queue, preserving their
    /// relative order. Returns `None` when the push fit locally.
    pub fn push(&self, item: Arc<Task>) -> Option<Vec<Arc<Task>>> {
        let mut q = self.queue.lock();
        if q.len() < self.capacity {
            q.push_back(item);
            self.len.store(q.len(), Ordering::Release);
            return None;
        }

        let half = self.capacity / 2;
        let mut overflow = Vec::with_capacity(half + 1);
        for _ in 0..half {
            if let Some(t) = q.pop_front() {
                overflow.push(t);
            }
        }
        overflow.push(item);
        self.len.store(q.len(), Ordering::Release);
        Some(overflow)
    }

    /// Pop from the front (FIFO).
    pub fn pop(&self) -> Option<Arc<Task>> {
        if self.len.load(Ordering::Acquire) == 0 {
            return None;
        }
        let mut q = self.queue.lock();
        let item = q.pop_front();
        self.len.store(q.len(), Ordering::Release);
        item
    }

    /// Remove and return roughly half the queue's contents (oldest
    /// first), for another worker to steal. Empty if the queue has fewer
    /// than two items.
    pub fn steal_half(&self) -> Vec<Arc<Task>> {
        if self.len.load(Ordering::Acquire) < 2 {
            return Vec::new();
        }
        let mut q = self.queue.lock();
        let n = q.len() / 2;
        let mut stolen = Vec::with_capacity(n);
        for _ in 0..n {
            if let Some(t) = q.pop_front() {
                stolen.push(t);
            }
        }
        self.len.store(q.len(), Ordering::Release);
        stolen
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tests::noop_task;

    #[test]
    fn push_pop_fifo() {
        let q = LocalQueue::new(4);
        assert!(q.push(noop_task(1)).is_none());
        assert!(q.push(noop_task(2)).is_none());
        assert_eq!(q.pop().unwrap().debug_id(), 1);
        assert_eq!(q.pop().unwrap().debug_id(), 2);
        assert!(q.pop().is_none());
    }

    #[test]
    fn overflow_spills_half_plus_new_in_order() {
        let q = LocalQueue::new(4);
        for i in 0..4 {
            assert!(q.push(noop_task(i)).is_none());
        }
        let overflow = q.push(noop_task(4)).expect("should overflow");
        // half of 4 = 2 oldest (0, 1), then the new item (4).
        let ids: Vec<_> = overflow.iter().map(|t| t.debug_id()).collect();
        assert_eq!(ids, vec![0, 1, 4]);
        assert_eq!(q.len(), 3); // 2, 3 remain plus nothing pushed back locally
    }

    #[test]
    fn steal_half_takes_oldest() {
        let q = LocalQueue::new(8);
        for i in 0..4 {
            q.push(noop_task(i));
        }
        let stolen = q.steal_half();
        let ids: Vec<_> = stolen.iter().map(|t| t.debug_id()).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn steal_half_empty_below_two() {
        let q = LocalQueue::new(8);
        q.push(noop_task(0));
        assert!(q.steal_half().is_empty());
    }
}
