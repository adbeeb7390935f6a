//! Sleeping and timeouts backed by the runtime's timer wheel.

use std::time::Duration;

pub use ringrt_runtime::Sleep;

/// Suspend the current task for `duration`, yielding the worker to
/// other tasks in the meantime.
pub fn sleep(duration: Duration) -> Sleep {
    Sleep::new(duration)
}
