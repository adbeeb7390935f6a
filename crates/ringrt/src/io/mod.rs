//! Minimal file-descriptor I/O built on the Submission registrator:
//! `read`, `write`, `fsync`, and a `timeout` combinator. Not a general
//! file/socket API — just enough to drive the registrator end-to-end
//! (see `cmd/echo`) and to let application code race an operation
//! against a deadline.

mod ops;

use std::os::unix::io::RawFd;
use std::time::Duration;

use ringrt_core::TaskResult;
use ringrt_runtime::IoFuture;

pub use ops::{Fsync, Read, Timeout, Write};

/// Read into `buf` from `fd` at the current file position.
pub fn read(fd: RawFd, buf: &mut [u8]) -> impl std::future::Future<Output = TaskResult<i32>> {
    Read::new(fd, buf)
}

/// Write `buf` to `fd` at the current file position.
pub fn write(fd: RawFd, buf: &[u8]) -> impl std::future::Future<Output = TaskResult<i32>> {
    Write::new(fd, buf)
}

/// Flush `fd` to disk, including metadata.
pub fn fsync(fd: RawFd) -> impl std::future::Future<Output = TaskResult<i32>> {
    Fsync::new(fd, false)
}

/// Race `op` against `duration`, cancelling it through the driver if
/// the deadline elapses first.
pub fn timeout<Op: ringrt_runtime::Prepare + Unpin>(
    op: IoFuture<Op>,
    duration: Duration,
) -> Timeout<Op> {
    Timeout::new(op, duration)
}
