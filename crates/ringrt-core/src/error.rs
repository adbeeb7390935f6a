//! Task-facing error types.
//!
//! These are the errors a coroutine sees when an awaited operation fails.
//! They are deliberately small and stable: internal plumbing failures
//! (ring setup, submit retries, wake writes) are logged through
//! [`crate::log`] and never surface here, except the two conditions that
//! make runtime construction itself fail (ring init, eventfd allocation).

use core::fmt;

/// Result type for task-facing operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors observable by user code awaiting an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// The kernel completed the operation with a negative result; the
    /// payload is the positive `errno`.
    SystemError(i32),

    /// The operation (or its owning task) was cancelled before completing.
    Cancelled,

    /// The resource the operation targeted (fd, ring) was closed.
    Closed,

    /// A scheduler-side resource (queue slot, submission slot) was
    /// exhausted and could not be allocated for the request.
    ResourceExhausted,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::SystemError(errno) => write!(f, "system error (errno {})", errno),
            TaskError::Cancelled => write!(f, "operation cancelled"),
            TaskError::Closed => write!(f, "resource closed"),
            TaskError::ResourceExhausted => write!(f, "resource exhausted"),
        }
    }
}

impl std::error::Error for TaskError {}

impl TaskError {
    /// Build a `TaskError` from a raw io_uring completion result.
    ///
    /// `result` follows the kernel convention: negative values are
    /// `-errno`. Callers must not pass a non-negative (successful) result.
    pub fn from_cqe_result(result: i32) -> Self {
        debug_assert!(result < 0, "from_cqe_result called on a successful result");
        match -result {
            libc::ECANCELED => TaskError::Cancelled,
            errno => TaskError::SystemError(errno),
        }
    }
}

/// Errors reported through a `JoinHandle` about the *task* itself, as
/// opposed to an individual I/O operation it awaited.
#[derive(Debug)]
pub enum JoinError {
    /// The task was cancelled before it produced a value.
    Cancelled,
    /// The task's future panicked while being polled.
    Panicked(Box<dyn std::any::Any + Send + 'static>),
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::Cancelled => write!(f, "task cancelled"),
            JoinError::Panicked(_) => write!(f, "task panicked"),
        }
    }
}

impl std::error::Error for JoinError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_error_from_cqe() {
        assert_eq!(TaskError::from_cqe_result(-32), TaskError::SystemError(32));
    }

    #[test]
    fn cancelled_from_cqe() {
        assert_eq!(
            TaskError::from_cqe_result(-libc::ECANCELED),
            TaskError::Cancelled
        );
    }

    #[test]
    fn display_is_non_empty() {
        assert!(!TaskError::Closed.to_string().is_empty());
        assert!(!JoinError::Cancelled.to_string().is_empty());
    }
}
