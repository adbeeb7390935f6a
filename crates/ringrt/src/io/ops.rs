//! `Prepare` implementations for the minimal operation set: reading,
//! writing, and fsyncing a raw file descriptor, plus a timeout wrapper
//! that races any of them against a deadline.
//!
//! These exist to exercise the Submission registrator end-to-end (see
//! the pipe echo demo in `cmd/echo`), not as a general file/socket API.

use std::future::Future;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use io_uring::{opcode, squeue, types};

use ringrt_core::TaskResult;
use ringrt_runtime::{tls, IoFuture, Prepare, Sleep};

/// Read into `buf` from `fd` at the current file position.
pub struct Read {
    fd: RawFd,
    buf: *mut u8,
    len: u32,
}

// Safety: the buffer outlives the future (the caller holds it) and is
// never accessed anywhere else while the operation is in flight.
unsafe impl Send for Read {}

impl Read {
    /// `buf` must stay valid and unaliased for as long as the returned
    /// future is alive; callers own `buf` for that duration (typically
    /// by holding it in the same async block that awaits the future).
    pub fn new(fd: RawFd, buf: &mut [u8]) -> IoFuture<Read> {
        IoFuture::new(Read {
            fd,
            buf: buf.as_mut_ptr(),
            len: buf.len() as u32,
        })
    }
}

impl Prepare for Read {
    fn build_entry(&mut self, user_data: u64) -> squeue::Entry {
        opcode::Read::new(types::Fd(self.fd), self.buf, self.len)
            .build()
            .user_data(user_data)
    }
}

/// Write `buf` to `fd` at the current file position.
pub struct Write {
    fd: RawFd,
    buf: *const u8,
    len: u32,
}

unsafe impl Send for Write {}

impl Write {
    pub fn new(fd: RawFd, buf: &[u8]) -> IoFuture<Write> {
        IoFuture::new(Write {
            fd,
            buf: buf.as_ptr(),
            len: buf.len() as u32,
        })
    }
}

impl Prepare for Write {
    fn build_entry(&mut self, user_data: u64) -> squeue::Entry {
        opcode::Write::new(types::Fd(self.fd), self.buf, self.len)
            .build()
            .user_data(user_data)
    }
}

/// Flush `fd`'s data (and, if `data_sync` is false, its metadata) to disk.
pub struct Fsync {
    fd: RawFd,
    data_sync: bool,
}

impl Fsync {
    pub fn new(fd: RawFd, data_sync: bool) -> IoFuture<Fsync> {
        IoFuture::new(Fsync { fd, data_sync })
    }
}

impl Prepare for Fsync {
    fn build_entry(&mut self, user_data: u64) -> squeue::Entry {
        let mut op = opcode::Fsync::new(types::Fd(self.fd));
        if self.data_sync {
            op = op.flags(types::FsyncFlags::DATASYNC);
        }
        op.build().user_data(user_data)
    }
}

/// Races an operation against a deadline, asking the driver to cancel
/// the submission if the deadline elapses first. The kernel completes a
/// cancelled operation with `-ECANCELED`, which the inner future
/// translates to `TaskError::Cancelled` — so this resolves exactly like
/// the operation would have, just possibly with that outcome.
pub struct Timeout<Op: Prepare> {
    op: IoFuture<Op>,
    sleep: Sleep,
    cancel_sent: bool,
}

impl<Op: Prepare> Timeout<Op> {
    pub fn new(op: IoFuture<Op>, duration: Duration) -> Self {
        Timeout {
            op,
            sleep: Sleep::new(duration),
            cancel_sent: false,
        }
    }
}

impl<Op: Prepare + Unpin> Future for Timeout<Op> {
    type Output = TaskResult<i32>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Poll::Ready(result) = Pin::new(&mut this.op).poll(cx) {
            return Poll::Ready(result);
        }

        if !this.cancel_sent {
            if Pin::new(&mut this.sleep).poll(cx).is_ready() {
                this.cancel_sent = true;
                if let Some(user_data) = this.op.user_data() {
                    tls::with_current_driver(|driver| driver.cancel(user_data));
                }
            }
        }

        Poll::Pending
    }
}
