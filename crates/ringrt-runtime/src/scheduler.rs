//! Builds and owns the worker pool: one `Driver` and one `LocalQueue`
//! per OS thread, a `GlobalQueue` shared by all of them, and the thread
//! handles needed to shut the pool down cleanly.

use std::future::Future;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle as ThreadHandle;

use ringrt_core::cancel::CancellationToken;
use ringrt_core::kinfo;

use crate::config::Config;
use crate::driver::Driver;
use crate::queue::{GlobalQueue, LocalQueue};
use crate::task::{self, JoinHandle, Task};
use crate::timer::{TimerHandle, TimerThread};
use crate::worker::{self, WorkerContext};

/// State shared by every worker thread and by handles spawning onto the
/// pool from outside it.
pub struct SchedulerShared {
    pub(crate) global: GlobalQueue,
    pub(crate) locals: Vec<Arc<LocalQueue>>,
    pub(crate) timer: TimerHandle,
    wake_fds: Vec<RawFd>,
    pub(crate) shutdown: AtomicBool,
}

impl SchedulerShared {
    /// Wake an arbitrary idle worker — used when work lands on the
    /// global queue and every worker might currently be parked in its
    /// driver's blocking wait rather than in `GlobalQueue::park`.
    pub(crate) fn wake_any(&self, hint: usize) {
        self.global.wake_one();
        if let Some(&fd) = self.wake_fds.get(hint % self.wake_fds.len().max(1)) {
            Driver::wake_up(fd);
        }
    }

    pub(crate) fn wake_all(&self) {
        self.global.wake_all();
        for &fd in &self.wake_fds {
            Driver::wake_up(fd);
        }
    }

    /// Spawn `future`, returning a handle to observe its outcome. Placed
    /// on the calling worker's own local queue when called from inside a
    /// worker; otherwise round-robined across workers' local queues.
    pub fn spawn_with_cancel<F>(self: &Arc<Self>, future: F, cancel: CancellationToken) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (task, handle) = task::spawn_task(future, Arc::downgrade(self), cancel);
        self.place(task);
        handle
    }

    fn place(self: &Arc<Self>, task: Arc<Task>) {
        let target = match crate::tls::worker_id() {
            Some(id) if id < self.locals.len() => id,
            _ => NEXT_WORKER.fetch_add(1, Ordering::Relaxed) % self.locals.len(),
        };
        crate::queue::push_local_or_spill(&self.locals[target], &self.global, task);
        self.wake_any(target);
    }
}

/// Round-robin cursor for placing work spawned off a worker thread (no
/// local queue of its own to prefer). Shared across schedulers in the
/// rare case a process runs more than one `Runtime`; the bias this
/// introduces between them is immaterial.
static NEXT_WORKER: AtomicUsize = AtomicUsize::new(0);

/// Spawn onto whichever scheduler owns the task currently being polled
/// on this thread. `None` off a worker thread — callers there should
/// hold their own `Scheduler`/`Runtime` handle instead.
pub fn spawn_from_current<F>(future: F) -> Option<JoinHandle<F::Output>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let scheduler = task::current_task()?.scheduler()?;
    Some(scheduler.spawn_with_cancel(future, CancellationToken::new()))
}

/// Like [`spawn_from_current`], but also hands back the fresh
/// `CancellationToken` the spawned task was given, so the caller can
/// cancel that one task later without affecting anything else.
pub fn spawn_from_current_cancellable<F>(
    future: F,
) -> Option<(JoinHandle<F::Output>, CancellationToken)>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let scheduler = task::current_task()?.scheduler()?;
    let cancel = CancellationToken::new();
    let handle = scheduler.spawn_with_cancel(future, cancel.clone());
    Some((handle, cancel))
}

/// Owns the worker pool. Dropping it without calling [`shutdown`] leaks
/// the worker threads (they run until the process exits); `Runtime` in
/// the `ringrt` facade crate calls `shutdown` from its own `Drop`.
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    handles: Vec<ThreadHandle<()>>,
    timer: TimerThread,
}

impl Scheduler {
    pub fn new(config: &Config) -> io::Result<Scheduler> {
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let num_workers = config.num_workers;
        let mut locals = Vec::with_capacity(num_workers);
        let mut drivers = Vec::with_capacity(num_workers);
        let mut wake_fds = Vec::with_capacity(num_workers);

        for _ in 0..num_workers {
            locals.push(Arc::new(LocalQueue::new(config.local_queue_capacity)));
            let driver = Driver::new(config.ring_entries, config.submit_interval)?;
            wake_fds.push(driver.wake_fd());
            drivers.push(driver);
        }

        let timer = TimerThread::start();

        let shared = Arc::new(SchedulerShared {
            global: GlobalQueue::new(),
            locals,
            timer: timer.handle(),
            wake_fds,
            shutdown: AtomicBool::new(false),
        });

        let mut handles = Vec::with_capacity(num_workers);
        for (id, driver) in drivers.into_iter().enumerate() {
            let ctx = WorkerContext {
                id,
                local: shared.locals[id].clone(),
                driver,
                shared: shared.clone(),
                check_io_interval: config.check_io_interval,
                check_global_interval: config.check_global_interval,
            };
            let handle = std::thread::Builder::new()
                .name(format!("ringrt-worker-{id}"))
                .spawn(move || worker::run(ctx))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        kinfo!("scheduler started with {} workers", num_workers);

        Ok(Scheduler {
            shared,
            handles,
            timer,
        })
    }

    /// Spawn `future` onto the pool, returning a handle to observe its
    /// outcome. Placed on the calling worker's own local queue when
    /// called from inside a worker (cheapest case); otherwise on a
    /// round-robin chosen worker's local queue (falling back to its
    /// overflow path like any other push).
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.spawn_with_cancel(future, CancellationToken::new())
    }

    pub fn spawn_with_cancel<F>(
        &self,
        future: F,
        cancel: CancellationToken,
    ) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.shared.spawn_with_cancel(future, cancel)
    }

    pub fn num_workers(&self) -> usize {
        self.handles.len()
    }

    /// Signal every worker to stop after its current task and join all
    /// worker threads.
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        self.timer.shutdown();
        kinfo!("scheduler shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_any_does_not_panic_with_single_worker() {
        let shared = SchedulerShared {
            global: GlobalQueue::new(),
            locals: vec![Arc::new(LocalQueue::new(4))],
            timer: crate::timer::TimerHandle::new(),
            wake_fds: vec![],
            shutdown: AtomicBool::new(false),
        };
        shared.wake_any(0);
    }

    /// External per-task cancellation: a caller holding the token handed
    /// back by `spawn_with_cancel` can cancel that one task from outside
    /// it, and its `JoinHandle` observes `Cancelled` without the task's
    /// own future ever needing to check anything.
    #[test]
    fn external_cancel_resolves_join_handle_as_cancelled() {
        let mut scheduler = match Scheduler::new(&crate::config::Config::new().num_workers(1)) {
            Ok(s) => s,
            Err(_) => return, // no io_uring support in this sandbox
        };

        let cancel = CancellationToken::new();
        let handle = scheduler.spawn_with_cancel(std::future::pending::<()>(), cancel.clone());
        cancel.cancel();

        let (tx, rx) = std::sync::mpsc::channel();
        scheduler.spawn(async move {
            let _ = tx.send(handle.await);
        });

        let result = rx.recv_timeout(std::time::Duration::from_secs(5));
        scheduler.shutdown();

        match result {
            Ok(Err(ringrt_core::JoinError::Cancelled)) => {}
            other => panic!("expected Err(Cancelled), got {other:?}"),
        }
    }

    /// Worker shutdown drains outstanding work instead of abandoning it:
    /// a task still sitting in the queue when `shutdown` runs has its
    /// cancellation token flipped and is polled to completion, the same
    /// as a task cancelled from outside one ever would be.
    #[test]
    fn shutdown_drains_queued_task_as_cancelled() {
        let mut scheduler = match Scheduler::new(&crate::config::Config::new().num_workers(1)) {
            Ok(s) => s,
            Err(_) => return, // no io_uring support in this sandbox
        };

        // Occupies the single worker thread inside `poll_once` long
        // enough for the task spawned right after it to still be sitting
        // in the local queue, unpolled, when `shutdown` sets the flag.
        struct BlockOnce;
        impl std::future::Future for BlockOnce {
            type Output = ();
            fn poll(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<()> {
                std::thread::sleep(std::time::Duration::from_millis(150));
                std::task::Poll::Pending
            }
        }

        scheduler.spawn(BlockOnce);
        let mut handle = scheduler.spawn(std::future::pending::<()>());

        scheduler.shutdown();

        let waker = noop_waker();
        let mut cx = std::task::Context::from_waker(&waker);
        match std::pin::Pin::new(&mut handle).poll(&mut cx) {
            std::task::Poll::Ready(Err(ringrt_core::JoinError::Cancelled)) => {}
            other => panic!("expected Ready(Err(Cancelled)), got {other:?}"),
        }
    }

    fn noop_waker() -> std::task::Waker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> std::task::RawWaker {
            std::task::RawWaker::new(std::ptr::null(), &VTABLE)
        }
        static VTABLE: std::task::RawWakerVTable =
            std::task::RawWakerVTable::new(clone, no_op, no_op, no_op);
        unsafe { std::task::Waker::from_raw(std::task::RawWaker::new(std::ptr::null(), &VTABLE)) }
    }
}
