//! Thread-local worker context.
//!
//! Established by a worker's thread entry point, read by whatever code
//! happens to run while a future is being polled on that thread (the
//! Submission registrator needs the current worker's driver; the demo
//! binaries and tests want to name the worker in logs).

use std::cell::Cell;

use crate::driver::Driver;
use crate::task::Task;

thread_local! {
    static WORKER_ID: Cell<usize> = const { Cell::new(usize::MAX) };
    static CURRENT_DRIVER: Cell<*mut Driver> = const { Cell::new(std::ptr::null_mut()) };
    static CURRENT_TASK: Cell<*const Task> = const { Cell::new(std::ptr::null()) };
}

/// Set the current worker id for this OS thread.
pub fn set_worker_id(id: usize) {
    WORKER_ID.with(|cell| cell.set(id));
    ringrt_core::log::set_worker_id(id as u32);
}

pub fn clear_worker_id() {
    WORKER_ID.with(|cell| cell.set(usize::MAX));
    ringrt_core::log::clear_worker_id();
}

/// The current worker id, or `None` off a worker thread (e.g. the thread
/// that called `Runtime::spawn` from outside the pool).
#[inline]
pub fn worker_id() -> Option<usize> {
    let id = WORKER_ID.with(|cell| cell.get());
    if id == usize::MAX {
        None
    } else {
        Some(id)
    }
}

/// Register this thread's driver for the duration of the worker loop.
///
/// # Safety
/// The pointer must stay valid for as long as it remains registered;
/// the worker clears it before the `Driver` is dropped.
pub unsafe fn set_current_driver(driver: *mut Driver) {
    CURRENT_DRIVER.with(|cell| cell.set(driver));
}

pub fn clear_current_driver() {
    CURRENT_DRIVER.with(|cell| cell.set(std::ptr::null_mut()));
}

/// Borrow the current worker's driver.
///
/// Panics if called off a worker thread — the Submission registrator
/// only runs while a task is being polled by a worker, which always has
/// a driver registered.
pub fn with_current_driver<R>(f: impl FnOnce(&mut Driver) -> R) -> R {
    CURRENT_DRIVER.with(|cell| {
        let ptr = cell.get();
        assert!(
            !ptr.is_null(),
            "no current driver: I/O awaited off a worker thread"
        );
        // Safety: only non-null while the owning worker's loop is on the
        // call stack below us, and only that thread ever sets/reads it.
        f(unsafe { &mut *ptr })
    })
}

/// Register the task currently being polled on this thread, for the
/// duration of the call to `Task::poll_once`. The Submission registrator
/// reads this to hand the driver an owned `Arc<Task>` to resume directly
/// on I/O completion, without going through a type-erased `Waker`.
///
/// # Safety
/// Caller must clear it (or let the RAII guard do so) before `task` is
/// dropped or reused for another poll.
pub(crate) unsafe fn set_current_task(task: *const Task) {
    CURRENT_TASK.with(|cell| cell.set(task));
}

pub(crate) fn clear_current_task() {
    CURRENT_TASK.with(|cell| cell.set(std::ptr::null()));
}

/// Borrow the task currently being polled on this thread, if any.
///
/// `None` when called off a worker thread, or when a future parks a
/// clone of its waker and calls it later from elsewhere — callers that
/// need an owned handle regardless should fall back to the generic
/// `Waker` path.
pub(crate) fn current_task_ptr() -> Option<*const Task> {
    let ptr = CURRENT_TASK.with(|cell| cell.get());
    if ptr.is_null() {
        None
    } else {
        Some(ptr)
    }
}
