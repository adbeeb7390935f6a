//! # ringrt-core
//!
//! Small, platform-agnostic primitives shared by the runtime: task-facing
//! error types, cooperative cancellation, an internal spinlock, `RT_*`
//! environment variable parsing, and leveled logging macros. No I/O, no
//! scheduling — `ringrt-runtime` builds on top of this.
//!
//! ## Modules
//!
//! - `error` - `TaskError`/`JoinError` and their `Result` aliases
//! - `cancel` - cooperative cancellation tokens
//! - `spinlock` - internal spinlock primitive
//! - `log` - kernel-style leveled logging macros
//! - `env` - environment variable utilities

#![allow(dead_code)]

pub mod cancel;
pub mod env;
pub mod error;
pub mod log;
pub mod spinlock;

pub use cancel::CancellationToken;
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};
pub use error::{JoinError, TaskError, TaskResult};
pub use spinlock::SpinLock;
