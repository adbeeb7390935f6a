//! The worker event loop: pop a ready task off the local queue (falling
//! back to the global queue, then to stealing from a sibling), poll it
//! once, and periodically check the I/O driver and global queue so
//! neither starves a worker that only ever has local work.
//!
//! Mirrors the shape of the workspace's earlier `run_worker_loop` —
//! "get next ready work, run it, repeat until told to stop" — but the
//! unit of work is a `Task::poll_once()` call instead of a context
//! switch into a coroutine's saved registers, and "nothing ready" blocks
//! on this worker's own `io_uring` completion queue instead of a futex.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use ringrt_core::ktrace;

use crate::driver::Driver;
use crate::queue::LocalQueue;
use crate::scheduler::SchedulerShared;
use crate::task::Task;
use crate::tls;

pub(crate) struct WorkerContext {
    pub(crate) id: usize,
    pub(crate) local: Arc<LocalQueue>,
    pub(crate) driver: Driver,
    pub(crate) shared: Arc<SchedulerShared>,
    pub(crate) check_io_interval: u32,
    pub(crate) check_global_interval: u32,
}

pub(crate) fn run(mut ctx: WorkerContext) {
    tls::set_worker_id(ctx.id);
    ringrt_core::log::set_worker_id(ctx.id as u32);
    // Safety: cleared before this function returns, and no other thread
    // ever touches this worker's `Driver`.
    unsafe { tls::set_current_driver(&mut ctx.driver as *mut Driver) };

    let mut pops: u32 = 0;

    loop {
        if ctx.shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        pops = pops.wrapping_add(1);
        if pops % ctx.check_io_interval == 0 {
            ctx.driver.poll_nonblocking(&ctx.local, &ctx.shared.global);
        }
        if pops % ctx.check_global_interval == 0 {
            pull_from_global(&ctx);
        }

        match next_task(&ctx) {
            Some(task) => task.poll_once(),
            None => {
                // Nothing runnable anywhere: block on this worker's own
                // ring. A sibling pushing work wakes us via our eventfd
                // (`SchedulerShared::wake_any`/`wake_all`); a real I/O
                // completion wakes us directly.
                let _ = ctx.driver.poll(&ctx.local, &ctx.shared.global);
            }
        }
    }

    drain_on_shutdown(&ctx);

    tls::clear_current_driver();
    tls::clear_worker_id();
    ringrt_core::log::clear_worker_id();
    ctx.driver.shutdown();
}

/// Run every task still sitting in this worker's own local queue or the
/// shared global queue down to a terminal state before the thread exits.
/// Each task's cancellation token is marked cancelled first, so its
/// `JoinFuture` completes as `Cancelled` on the next poll regardless of
/// what its inner future was waiting on: no task is ever abandoned
/// mid-queue at shutdown.
fn drain_on_shutdown(ctx: &WorkerContext) {
    while let Some(task) = ctx.local.pop().or_else(|| ctx.shared.global.pop()) {
        task.cancel.cancel();
        task.poll_once();
    }
}

fn next_task(ctx: &WorkerContext) -> Option<Arc<Task>> {
    if let Some(task) = ctx.local.pop() {
        return Some(task);
    }
    if let Some(task) = ctx.shared.global.pop() {
        return Some(task);
    }
    steal(ctx)
}

fn pull_from_global(ctx: &WorkerContext) {
    if ctx.local.is_empty() {
        let batch = ctx.shared.global.pop_batch(ctx.local.len().max(1));
        for task in batch {
            if let Some(overflow) = ctx.local.push(task) {
                ctx.shared.global.push_batch(overflow);
            }
        }
    }
}

fn steal(ctx: &WorkerContext) -> Option<Arc<Task>> {
    let n = ctx.shared.locals.len();
    for offset in 1..n {
        let victim = (ctx.id + offset) % n;
        let stolen = ctx.shared.locals[victim].steal_half();
        if stolen.is_empty() {
            continue;
        }
        ktrace!("worker {} stole {} tasks from worker {}", ctx.id, stolen.len(), victim);
        let mut iter = stolen.into_iter();
        let first = iter.next();
        for task in iter {
            if let Some(overflow) = ctx.local.push(task) {
                ctx.shared.global.push_batch(overflow);
            }
        }
        return first;
    }
    None
}
