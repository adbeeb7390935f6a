//! Ready-queue pair: a bounded per-worker local queue backed by an
//! unbounded global queue, with work-stealing between local queues.
//!
//! Mirrors the shape of the workspace's earlier Go-like MVP queue
//! (per-worker `SpinLock<VecDeque>` + global `Mutex<VecDeque>` +
//! `Condvar`), but implements the overflow-spill rule precisely: when a
//! local push would overflow, half the local queue plus the new item
//! move to the global queue in one batch, oldest-first, so relative
//! order across the spilled items is preserved.

mod global;
mod local;

pub use global::GlobalQueue;
pub use local::LocalQueue;

use std::sync::Arc;

use crate::task::Task;

/// Push `item` onto `local`, spilling to `global` if the local queue is
/// full. Wakes a parked worker when the item lands on the global queue
/// (workers sleeping in `GlobalQueue::park` only observe the global
/// queue, not siblings' local queues).
pub fn push_local_or_spill(local: &LocalQueue, global: &GlobalQueue, item: Arc<Task>) {
    if let Some(overflow) = local.push(item) {
        global.push_batch(overflow);
        global.wake_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tests::noop_task;

    #[test]
    fn spill_preserves_order_and_wakes() {
        let local = LocalQueue::new(4);
        let global = GlobalQueue::new();

        for i in 0..4 {
            push_local_or_spill(&local, &global, noop_task(i));
        }
        assert_eq!(local.len(), 4);
        assert_eq!(global.len(), 0);

        // 5th push overflows: half (2) + new item (3 total) spill to global.
        push_local_or_spill(&local, &global, noop_task(4));
        assert_eq!(local.len(), 3);
        assert_eq!(global.len(), 3);
    }
}
