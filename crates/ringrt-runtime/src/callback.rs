//! Per-operation completion slot, addressed by an io_uring SQE's
//! `user_data` field.
//!
//! One `Callback` is allocated per in-flight operation. Its address is
//! handed to the kernel as `user_data` (via `Arc::into_raw`, balanced by
//! `Arc::from_raw` when the matching CQE is reaped), so the driver needs
//! no side table to find it again.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Waker;

use crate::task::Task;

const NO_RESULT: i64 = i64::MIN;

pub(crate) struct Callback {
    result: AtomicI64,
    exclusive: bool,
    task: Mutex<Option<Arc<Task>>>,
    waker: Mutex<Option<Waker>>,
}

impl Callback {
    pub(crate) fn new(task: Option<Arc<Task>>, exclusive: bool) -> Arc<Callback> {
        Arc::new(Callback {
            result: AtomicI64::new(NO_RESULT),
            exclusive,
            task: Mutex::new(task),
            waker: Mutex::new(None),
        })
    }

    #[inline]
    pub(crate) fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub(crate) fn set_waker(&self, waker: Waker) {
        *self.waker.lock().unwrap() = Some(waker);
    }

    /// The cqe result, once the kernel has completed this operation.
    pub(crate) fn take_result(&self) -> Option<i32> {
        match self.result.load(Ordering::Acquire) {
            NO_RESULT => None,
            r => Some(r as i32),
        }
    }

    /// Called by the driver from its completion-processing loop.
    pub(crate) fn complete(&self, result: i32) {
        self.result.store(result as i64, Ordering::Release);
    }

    pub(crate) fn take_task(&self) -> Option<Arc<Task>> {
        self.task.lock().unwrap().take()
    }

    pub(crate) fn take_waker(&self) -> Option<Waker> {
        self.waker.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_result_until_completed() {
        let cb = Callback::new(None, false);
        assert!(cb.take_result().is_none());
        cb.complete(42);
        assert_eq!(cb.take_result(), Some(42));
    }

    #[test]
    fn negative_errno_result_round_trips() {
        let cb = Callback::new(None, false);
        cb.complete(-32); // -EPIPE
        assert_eq!(cb.take_result(), Some(-32));
    }

    #[test]
    fn take_task_is_one_shot() {
        let cb = Callback::new(None, true);
        assert!(cb.take_task().is_none());
        assert!(cb.is_exclusive());
    }
}
