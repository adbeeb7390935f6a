//! The scheduled unit: a heap-allocated, type-erased future plus the
//! state machine that turns "wake this" into "push this onto a queue".
//!
//! This is the Rust-native stand-in for what the original system calls a
//! coroutine frame / Ready handle: `Arc<Task>` is moved between queues,
//! never copied, and a `Task`'s own `Waker` (built once, cloned cheaply)
//! is what every suspension point — I/O, sleep, yield, join — eventually
//! calls to make it ready again.

use std::cell::UnsafeCell;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use ringrt_core::cancel::CancellationToken;
use ringrt_core::JoinError;

use crate::queue::{push_local_or_spill, GlobalQueue, LocalQueue};
use crate::scheduler::SchedulerShared;

const IDLE: u8 = 0;
const SCHEDULED: u8 = 1;
const RUNNING: u8 = 2;
const RUNNING_NOTIFIED: u8 = 3;
const COMPLETE: u8 = 4;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// A spawned future plus the bookkeeping needed to schedule it.
///
/// Exactly one worker polls a given `Task` at a time: `poll_once` is
/// only called by the executor after popping the task off a queue, which
/// only happens once per `Idle -> Scheduled` transition.
pub struct Task {
    id: u64,
    future: UnsafeCell<Pin<Box<dyn Future<Output = ()> + Send>>>,
    state: AtomicU8,
    scheduler: Weak<SchedulerShared>,
    pub(crate) cancel: CancellationToken,
}

// `future` is only ever touched from the single worker thread currently
// running `poll_once`, guarded by the `state` transitions above; `Task`
// is otherwise immutable.
unsafe impl Send for Task {}
unsafe impl Sync for Task {}

impl Task {
    pub(crate) fn new(
        future: Pin<Box<dyn Future<Output = ()> + Send>>,
        scheduler: Weak<SchedulerShared>,
        cancel: CancellationToken,
    ) -> Arc<Task> {
        Arc::new(Task {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            future: UnsafeCell::new(future),
            state: AtomicU8::new(SCHEDULED),
            scheduler,
            cancel,
        })
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Poll the task's future once. Must only be called by the executor
    /// immediately after popping this task from a ready queue (i.e. from
    /// the `Scheduled` state).
    pub(crate) fn poll_once(self: &Arc<Task>) {
        self.state.store(RUNNING, Ordering::Release);

        let waker = Self::waker(self);
        let mut cx = Context::from_waker(&waker);

        // Registered so the Submission registrator can hand the I/O
        // driver an owned `Arc<Task>` instead of a type-erased `Waker`;
        // cleared unconditionally via the guard even if polling panics.
        let _current_task_guard = CurrentTaskGuard::set(Arc::as_ptr(self));

        // Safety: only the thread running this function touches `future`,
        // and that thread holds the only `RUNNING` task of this id.
        //
        // A spawned task's future is always a `JoinFuture`, which already
        // catches panics and stores them as `JoinError::Panicked` for the
        // `JoinHandle` to observe, so no `catch_unwind` is needed here.
        let future = unsafe { &mut *self.future.get() };
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                self.state.store(COMPLETE, Ordering::Release);
            }
            Poll::Pending => {
                let prev = self.state.swap(IDLE, Ordering::AcqRel);
                if prev == RUNNING_NOTIFIED {
                    self.reschedule();
                }
            }
        }
    }

    /// Attempt the `Idle -> Scheduled` transition and, on success, hand
    /// this task to `schedule` to be enqueued. Every wake path — generic
    /// `Waker`, the driver's task-captured fast path, a timer firing —
    /// goes through this same CAS, so at most one copy of a given `Task`
    /// is ever sitting in a queue: a second waker firing while the first
    /// is already scheduled or running just flips `RUNNING_NOTIFIED` and
    /// returns without enqueuing anything.
    fn wake_with(self: &Arc<Task>, schedule: impl FnOnce(&Arc<Task>)) {
        loop {
            match self.state.load(Ordering::Acquire) {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, SCHEDULED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        schedule(self);
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(
                            RUNNING,
                            RUNNING_NOTIFIED,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        return;
                    }
                }
                SCHEDULED | RUNNING_NOTIFIED | COMPLETE => return,
                _ => unreachable!("invalid task state"),
            }
        }
    }

    /// Generic wake path: correct from any thread, used whenever the
    /// waking code doesn't know a more specific local queue to prefer.
    /// Pushes onto the scheduler's global queue.
    pub(crate) fn wake_generic(self: &Arc<Task>) {
        self.wake_with(Self::reschedule);
    }

    /// Wake path for the I/O driver's non-exclusive completion handling:
    /// prefers the completing worker's own local queue (falling back to
    /// `global` on overflow) instead of always going to the global queue,
    /// while still going through the same CAS as every other wake path.
    pub(crate) fn wake_local(self: &Arc<Task>, local: &LocalQueue, global: &GlobalQueue) {
        self.wake_with(|task| push_local_or_spill(local, global, task.clone()));
    }

    fn reschedule(self: &Arc<Task>) {
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.global.push(self.clone());
        }
    }

    /// The scheduler this task was spawned on, if it still exists.
    /// `Sleep` uses this to reach the shared timer wheel without its own
    /// thread-local, since it only ever runs while a task is live.
    pub(crate) fn scheduler(&self) -> Option<Arc<SchedulerShared>> {
        self.scheduler.upgrade()
    }

    fn waker(task: &Arc<Task>) -> Waker {
        let ptr = Arc::into_raw(task.clone()) as *const ();
        unsafe { Waker::from_raw(RawWaker::new(ptr, &TASK_VTABLE)) }
    }
}

/// Clones `Arc<Task>` back out of the thread-local raw pointer set by
/// `poll_once`, for code (the Submission registrator) that runs while a
/// task is being polled and needs an owned handle to it.
pub(crate) fn current_task() -> Option<Arc<Task>> {
    let ptr = crate::tls::current_task_ptr()?;
    // Safety: non-null only while `poll_once` holds a live `&Arc<Task>`
    // to the same object further up this thread's call stack.
    unsafe {
        Arc::increment_strong_count(ptr);
        Some(Arc::from_raw(ptr))
    }
}

struct CurrentTaskGuard;

impl CurrentTaskGuard {
    fn set(ptr: *const Task) -> Self {
        // Safety: cleared by `Drop` before `poll_once` returns, including
        // on the unwind path from a caught panic.
        unsafe { crate::tls::set_current_task(ptr) };
        CurrentTaskGuard
    }
}

impl Drop for CurrentTaskGuard {
    fn drop(&mut self) {
        crate::tls::clear_current_task();
    }
}

unsafe fn task_clone(ptr: *const ()) -> RawWaker {
    let arc = unsafe { Arc::from_raw(ptr as *const Task) };
    std::mem::forget(arc.clone());
    std::mem::forget(arc);
    RawWaker::new(ptr, &TASK_VTABLE)
}

unsafe fn task_wake(ptr: *const ()) {
    let arc = unsafe { Arc::from_raw(ptr as *const Task) };
    arc.wake_generic();
}

unsafe fn task_wake_by_ref(ptr: *const ()) {
    let arc = unsafe { Arc::from_raw(ptr as *const Task) };
    arc.wake_generic();
    std::mem::forget(arc);
}

unsafe fn task_drop(ptr: *const ()) {
    unsafe { drop(Arc::from_raw(ptr as *const Task)) };
}

static TASK_VTABLE: RawWakerVTable =
    RawWakerVTable::new(task_clone, task_wake, task_wake_by_ref, task_drop);

/// Shared slot a `JoinHandle` polls for the spawned task's outcome.
struct JoinInner<T> {
    result: Mutex<Option<Result<T, JoinError>>>,
    waker: Mutex<Option<Waker>>,
}

/// Wraps a user future so its output lands in a `JoinInner` and the
/// task-erased `Future<Output = ()>` contract `Task` requires is met.
struct JoinFuture<F: Future> {
    inner: Arc<JoinInner<F::Output>>,
    fut: F,
    cancel: CancellationToken,
}

impl<F: Future> Future for JoinFuture<F> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // Safety: structural pinning projection; `fut` is never moved out.
        let this = unsafe { self.get_unchecked_mut() };

        if this.cancel.is_cancelled() {
            Self::complete(&this.inner, Err(JoinError::Cancelled));
            return Poll::Ready(());
        }

        let fut = unsafe { Pin::new_unchecked(&mut this.fut) };
        match catch_unwind(AssertUnwindSafe(|| fut.poll(cx))) {
            Ok(Poll::Ready(value)) => {
                Self::complete(&this.inner, Ok(value));
                Poll::Ready(())
            }
            Ok(Poll::Pending) => Poll::Pending,
            Err(panic) => {
                Self::complete(&this.inner, Err(JoinError::Panicked(panic)));
                Poll::Ready(())
            }
        }
    }
}

impl<F: Future> JoinFuture<F> {
    fn complete<V>(inner: &Arc<JoinInner<V>>, value: Result<V, JoinError>) {
        *inner.result.lock().unwrap() = Some(value);
        if let Some(waker) = inner.waker.lock().unwrap().take() {
            waker.wake();
        }
    }
}

/// A `Future` resolving to a spawned task's output, or to the reason it
/// didn't produce one (cancellation, panic).
pub struct JoinHandle<T> {
    inner: Arc<JoinInner<T>>,
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.inner.result.lock().unwrap();
        if let Some(result) = slot.take() {
            return Poll::Ready(result);
        }
        drop(slot);
        *self.inner.waker.lock().unwrap() = Some(cx.waker().clone());
        // Re-check after registering the waker to avoid a missed wakeup
        // if completion raced us between the two locks.
        slot = self.inner.result.lock().unwrap();
        match slot.take() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

/// Build the `(Arc<Task>, JoinHandle<T>)` pair for a user future.
pub(crate) fn spawn_task<F>(
    future: F,
    scheduler: Weak<SchedulerShared>,
    cancel: CancellationToken,
) -> (Arc<Task>, JoinHandle<F::Output>)
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let inner = Arc::new(JoinInner {
        result: Mutex::new(None),
        waker: Mutex::new(None),
    });
    let join_future = JoinFuture {
        inner: inner.clone(),
        fut: future,
        cancel: cancel.clone(),
    };
    let task = Task::new(Box::pin(join_future), scheduler, cancel);
    (task, JoinHandle { inner })
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::future::ready;

    /// A task whose future resolves immediately, for exercising queues
    /// without a running scheduler.
    pub fn noop_task(id: u64) -> Arc<Task> {
        let task = Task::new(Box::pin(ready(())), Weak::new(), CancellationToken::dummy());
        // Override the auto-assigned id so tests can assert on a known
        // sequence regardless of allocation order.
        unsafe {
            let ptr = Arc::as_ptr(&task) as *mut Task;
            (*ptr).id = id;
        }
        task
    }

    impl Task {
        pub fn debug_id(&self) -> u64 {
            self.id
        }
    }

    #[test]
    fn poll_once_completes_ready_future() {
        let task = Task::new(
            Box::pin(ready(())),
            Weak::new(),
            CancellationToken::dummy(),
        );
        task.poll_once();
        assert_eq!(task.state.load(Ordering::Acquire), COMPLETE);
    }

    #[test]
    fn wake_generic_without_scheduler_is_noop_not_panic() {
        let task = Task::new(
            Box::pin(std::future::pending::<()>()),
            Weak::new(),
            CancellationToken::dummy(),
        );
        task.state.store(IDLE, Ordering::Release);
        task.wake_generic();
        assert_eq!(task.state.load(Ordering::Acquire), SCHEDULED);
    }
}
