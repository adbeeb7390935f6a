//! Timer wheel plus the background thread that drives it and the
//! `Sleep` future user code awaits.
//!
//! Shaped after the workspace's earlier preemption timer thread: a
//! dedicated OS thread ticking on a fixed interval, started alongside
//! the worker pool and joined on shutdown via the same
//! `Arc<AtomicBool>` shutdown-flag pattern, except this one fires
//! `Waker`s instead of scanning worker counters.

mod wheel;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use wheel::{Entry, Wheel};

/// Wheel tick granularity. Finer than this and cascading dominates;
/// coarser and short sleeps round up noticeably.
const TICK_DURATION: Duration = Duration::from_millis(1);

struct Inner {
    wheel: Mutex<Wheel>,
    start: Instant,
}

impl Inner {
    fn tick_for(&self, deadline: Instant) -> u64 {
        let elapsed = deadline.saturating_duration_since(self.start);
        (elapsed.as_nanos() / TICK_DURATION.as_nanos()) as u64
    }

    fn register(&self, deadline: Instant, waker: Waker) {
        let tick = self.tick_for(deadline);
        self.wheel.lock().unwrap().insert(tick, Entry { waker });
    }

    fn advance_to_now(&self) -> Vec<Entry> {
        let target = self.tick_for(Instant::now());
        self.wheel.lock().unwrap().advance_to(target)
    }
}

/// Shared handle to a running timer wheel; cloned into every `Sleep`
/// that needs to register a deadline and into the background thread
/// that advances it.
#[derive(Clone)]
pub(crate) struct TimerHandle {
    inner: Arc<Inner>,
}

impl TimerHandle {
    pub(crate) fn new() -> Self {
        TimerHandle {
            inner: Arc::new(Inner {
                wheel: Mutex::new(Wheel::new()),
                start: Instant::now(),
            }),
        }
    }

    pub(crate) fn register(&self, deadline: Instant, waker: Waker) {
        self.inner.register(deadline, waker);
    }
}

/// Owns the background thread that periodically advances a
/// [`TimerHandle`]'s wheel and wakes whatever fired.
pub(crate) struct TimerThread {
    handle: TimerHandle,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl TimerThread {
    pub(crate) fn start() -> TimerThread {
        let handle = TimerHandle::new();
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_handle = handle.clone();
        let thread_shutdown = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("ringrt-timer".to_string())
            .spawn(move || timer_loop(thread_handle, thread_shutdown))
            .expect("failed to spawn timer thread");

        TimerThread {
            handle,
            shutdown,
            join: Some(join),
        }
    }

    pub(crate) fn handle(&self) -> TimerHandle {
        self.handle.clone()
    }

    pub(crate) fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn timer_loop(handle: TimerHandle, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Acquire) {
        std::thread::sleep(TICK_DURATION);
        for entry in handle.inner.advance_to_now() {
            entry.waker.wake();
        }
    }
}

/// A `Future` that resolves once `Instant::now()` reaches its deadline.
pub struct Sleep {
    deadline: Instant,
}

impl Sleep {
    pub fn new(duration: Duration) -> Self {
        Sleep {
            deadline: Instant::now() + duration,
        }
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }
        // `Sleep` only ever runs while its owning task is being polled,
        // so the current task's scheduler always has a timer handle.
        match crate::task::current_task().and_then(|t| t.scheduler()) {
            Some(scheduler) => {
                scheduler.timer.register(self.deadline, cx.waker().clone());
                Poll::Pending
            }
            None => {
                // Polled directly, off a worker (e.g. a unit test):
                // nothing will ever wake us, so the caller must poll
                // again after the deadline itself.
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_immediately_for_zero_duration() {
        let sleep = Sleep::new(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(1));
        let waker = futures_noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut pinned = Box::pin(sleep);
        assert_eq!(pinned.as_mut().poll(&mut cx), Poll::Ready(()));
    }

    fn futures_noop_waker() -> Waker {
        use std::task::{RawWaker, RawWakerVTable};
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }
}
