//! Spawning onto the ambient runtime from inside a running task.
//!
//! These free functions mirror [`crate::Runtime::spawn`] but need no
//! explicit handle: they look up the `Scheduler` that owns the task
//! currently being polled on this worker thread. Calling them off a
//! worker thread (outside any task) returns `None`.

use std::future::Future;

use ringrt_core::CancellationToken;
use ringrt_runtime::JoinHandle;

/// Spawn `future` onto the scheduler driving the currently running task.
///
/// Returns `None` if called from outside a task (e.g. from `main`
/// before calling [`crate::Runtime::block_on`]) — use
/// [`crate::Runtime::spawn`] there instead.
pub fn spawn<F>(future: F) -> Option<JoinHandle<F::Output>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    ringrt_runtime::scheduler::spawn_from_current(future)
}

/// Like [`spawn`], but also returns the `CancellationToken` the spawned
/// task was given, so the caller can cancel that one task later:
/// `token.cancel()` makes the task's `JoinHandle` resolve to
/// `Err(JoinError::Cancelled)` the next time it's polled.
pub fn spawn_cancellable<F>(future: F) -> Option<(JoinHandle<F::Output>, CancellationToken)>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    ringrt_runtime::scheduler::spawn_from_current_cancellable(future)
}
