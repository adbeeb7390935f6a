//! # ringrt
//!
//! An asynchronous runtime for Linux built directly on io_uring: a
//! work-stealing pool of worker threads, each driving its own ring, and
//! a hierarchical timer wheel for sleeps and timeouts.
//!
//! ## Quick start
//!
//! ```ignore
//! use ringrt::Runtime;
//!
//! fn main() {
//!     let rt = Runtime::new().expect("failed to start runtime");
//!     rt.block_on(async {
//!         ringrt::task::spawn(async {
//!             println!("hello from a spawned task");
//!         });
//!         ringrt::time::sleep(std::time::Duration::from_millis(10)).await;
//!     });
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         User code                             │
//! │              task::spawn(), time::sleep(), io::*               │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Scheduler                             │
//! │     global queue, round-robin placement, shutdown signal      │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!        ┌──────────────────────┼──────────────────────┐
//!        ▼                      ▼                      ▼
//! ┌─────────────┐        ┌─────────────┐        ┌─────────────┐
//! │   Worker 0   │        │   Worker 1   │  ...   │ Timer thread │
//! │ local queue  │◄──────►│ local queue  │        │ (wheel tick) │
//! │ io_uring ring│        │ io_uring ring│        └─────────────┘
//! └─────────────┘        └─────────────┘
//! ```

pub mod io;
pub mod task;
pub mod time;

pub use ringrt_core::log::{init as init_logging, set_log_level, LogLevel};
pub use ringrt_core::{CancellationToken, JoinError, TaskError, TaskResult};
pub use ringrt_core::{kdebug, kerror, kinfo, ktrace, kwarn};
pub use ringrt_runtime::Config;
pub use ringrt_runtime::JoinHandle;

use std::future::Future;

use ringrt_runtime::Scheduler;

/// Owns the worker pool for the lifetime of the process (or however
/// long the application chooses to keep it alive). Shutting it down
/// joins every worker and timer thread; dropping it without an explicit
/// [`shutdown`](Runtime::shutdown) does this automatically.
pub struct Runtime {
    scheduler: Scheduler,
}

impl Runtime {
    /// Start a runtime sized by [`Config::from_env`] (worker count
    /// defaults to the machine's available parallelism).
    pub fn new() -> std::io::Result<Runtime> {
        Runtime::with_config(Config::from_env())
    }

    pub fn with_config(config: Config) -> std::io::Result<Runtime> {
        Ok(Runtime {
            scheduler: Scheduler::new(&config)?,
        })
    }

    /// Spawn `future` onto the pool without waiting for it.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.scheduler.spawn(future)
    }

    /// Spawn `future` onto the pool, also returning the fresh
    /// `CancellationToken` it was given. Calling `token.cancel()` later
    /// cancels only this one task: its `JoinHandle` resolves to
    /// `Err(JoinError::Cancelled)` the next time the task is polled,
    /// whatever it was doing at the time.
    pub fn spawn_cancellable<F>(&self, future: F) -> (JoinHandle<F::Output>, CancellationToken)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = self.scheduler.spawn_with_cancel(future, cancel.clone());
        (handle, cancel)
    }

    /// Spawn `future` and block the calling thread until it completes.
    ///
    /// The future itself still runs on the worker pool like any other
    /// spawned task; this just gives the calling thread (typically
    /// `main`, which is not a worker) a way to wait for the result.
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (tx, rx) = std::sync::mpsc::channel();
        self.scheduler.spawn(async move {
            let _ = tx.send(future.await);
        });
        rx.recv()
            .expect("task driving block_on's future was dropped without completing")
    }

    pub fn num_workers(&self) -> usize {
        self.scheduler.num_workers()
    }

    /// Signal every worker to stop after its current task and join all
    /// worker and timer threads.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
