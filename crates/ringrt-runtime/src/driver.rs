//! Per-worker I/O driver: owns one `io_uring::IoUring` plus the
//! nonblocking wake-up eventfd a sibling worker or the timer thread
//! writes to when it needs this worker to stop parking on completions.
//!
//! Submission mirrors the translate-then-push shape of the workspace's
//! earlier `BasicIoUring` backend (check `submission_shared().is_full()`
//! before building the SQE, push under the same lock, count pending
//! entries toward a periodic forced `submit()`), generalized from a
//! syscall-dispatch table to arbitrary pre-built `squeue::Entry` values
//! and extended with a waiting list for entries that arrive while the
//! ring is full.

use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;

use io_uring::{squeue, IoUring};

use ringrt_core::{kdebug, kerror, ktrace};

use crate::callback::Callback;
use crate::queue::{GlobalQueue, LocalQueue};

/// `user_data` reserved for the driver's own wake-up eventfd read. No
/// `Callback` is ever allocated at address zero (`Arc::into_raw` never
/// returns a null pointer), so this can't collide with a real operation.
const WAKE_USER_DATA: u64 = 0;

/// `user_data` reserved for `AsyncCancel` requests themselves; the
/// cancellation's own completion carries no callback to resume.
const CANCEL_USER_DATA: u64 = u64::MAX;

pub struct Driver {
    ring: IoUring,
    wake_fd: RawFd,
    wake_read_buf: Box<[u8; 8]>,
    wake_armed: bool,
    waiting: VecDeque<squeue::Entry>,
    pending_submit: u32,
    submit_interval: u32,
    ops_since_submit: u32,
    inflight: usize,
}

impl Driver {
    pub fn new(ring_entries: u32, submit_interval: u32) -> io::Result<Driver> {
        let ring = IoUring::builder().build(ring_entries)?;

        let wake_fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if wake_fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Driver {
            ring,
            wake_fd,
            wake_read_buf: Box::new([0u8; 8]),
            wake_armed: false,
            waiting: VecDeque::new(),
            pending_submit: 0,
            submit_interval: submit_interval.max(1),
            ops_since_submit: 0,
            inflight: 0,
        })
    }

    /// Raw fd other threads write to via [`wake_up`] to break this
    /// driver out of a blocking wait.
    pub fn wake_fd(&self) -> RawFd {
        self.wake_fd
    }

    /// Write to an eventfd to wake whatever driver owns it. A free
    /// function (not a `&self` method) because the caller only has the
    /// raw fd, not a reference to the owning worker's `Driver`.
    pub fn wake_up(fd: RawFd) {
        let one: u64 = 1;
        unsafe {
            libc::write(fd, &one as *const u64 as *const libc::c_void, 8);
        }
    }

    /// The ring's submission-queue capacity, for sizing local queues and
    /// deciding how aggressively to steal.
    pub fn capacity(&self) -> usize {
        self.ring.params().sq_entries() as usize
    }

    pub fn inflight(&self) -> usize {
        self.inflight
    }

    #[cfg(test)]
    fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Try to push `entry` onto the submission queue now. Returns the
    /// entry back on failure so the caller can queue it.
    fn try_push(&mut self, entry: squeue::Entry) -> Result<(), squeue::Entry> {
        let full = unsafe { self.ring.submission_shared().is_full() };
        if full {
            return Err(entry);
        }
        unsafe {
            self.ring
                .submission()
                .push(&entry)
                .expect("checked not full under exclusive access");
        }
        self.pending_submit += 1;
        self.inflight += 1;
        Ok(())
    }

    /// Submit `entry`, deferring it to the waiting list if the ring is
    /// full (or already has entries waiting ahead of it — new entries
    /// always join the back of that list so completion order isn't
    /// reshuffled by who happened to find a free slot first).
    pub fn submit(&mut self, entry: squeue::Entry) {
        if self.waiting.is_empty() {
            if let Err(entry) = self.try_push(entry) {
                self.waiting.push_back(entry);
            } else {
                self.maybe_force_submit();
            }
        } else {
            self.waiting.push_back(entry);
        }
    }

    fn maybe_force_submit(&mut self) {
        self.ops_since_submit += 1;
        if self.ops_since_submit >= self.submit_interval {
            if let Err(err) = self.force_submit() {
                kerror!("periodic submit failed: {err}");
            }
        }
    }

    /// Flush pending submissions to the kernel without blocking. Counters
    /// are reset unconditionally, even on error, so a submit failure can't
    /// wedge `maybe_force_submit` into retrying every single op forever;
    /// the next periodic flush (or the next explicit `submit`) tries again.
    pub fn force_submit(&mut self) -> io::Result<usize> {
        if self.pending_submit == 0 {
            return Ok(0);
        }
        let result = self.ring.submit();
        self.pending_submit = 0;
        self.ops_since_submit = 0;
        result
    }

    /// Request cancellation of the operation registered under `user_data`.
    pub fn cancel(&mut self, user_data: u64) {
        let sqe = io_uring::opcode::AsyncCancel::new(user_data)
            .build()
            .user_data(CANCEL_USER_DATA);
        self.submit(sqe);
    }

    /// Drain as much of the waiting list as the ring currently has room
    /// for. An entry is only ever removed once `try_push` confirms it
    /// landed in the ring; on the first failure it's put back at the
    /// front and draining stops, so nothing is ever silently dropped.
    fn drain_waiting(&mut self) {
        while let Some(entry) = self.waiting.pop_front() {
            match self.try_push(entry) {
                Ok(()) => continue,
                Err(entry) => {
                    self.waiting.push_front(entry);
                    break;
                }
            }
        }
    }

    fn arm_wake_read(&mut self) {
        let buf_ptr = self.wake_read_buf.as_mut_ptr();
        let sqe = io_uring::opcode::Read::new(io_uring::types::Fd(self.wake_fd), buf_ptr, 8)
            .build()
            .user_data(WAKE_USER_DATA);
        if self.try_push(sqe).is_ok() {
            self.wake_armed = true;
        }
    }

    fn wait_before(&mut self) {
        if !self.wake_armed {
            self.arm_wake_read();
        }
        self.drain_waiting();
    }

    /// Block until at least one completion is ready, then process all
    /// currently-available completions. Returns `true` if any completion
    /// (other than the driver's own wake-up read) was processed.
    pub fn poll(&mut self, local: &LocalQueue, global: &GlobalQueue) -> io::Result<bool> {
        self.wait_before();
        self.ring.submit_and_wait(1)?;
        Ok(self.drain_completions(local, global))
    }

    /// Process whatever completions are already queued, without blocking.
    pub fn poll_nonblocking(&mut self, local: &LocalQueue, global: &GlobalQueue) -> bool {
        self.wait_before();
        let _ = self.ring.submit();
        self.drain_completions(local, global)
    }

    fn drain_completions(&mut self, local: &LocalQueue, global: &GlobalQueue) -> bool {
        let mut exclusive: Vec<std::sync::Arc<Callback>> = Vec::new();
        let mut processed = false;

        for cqe in self.ring.completion() {
            self.inflight = self.inflight.saturating_sub(1);
            let user_data = cqe.user_data();

            if user_data == WAKE_USER_DATA {
                self.wake_armed = false;
                continue;
            }
            if user_data == CANCEL_USER_DATA {
                continue;
            }

            processed = true;
            // Safety: `user_data` is the address of an `Arc<Callback>`
            // leaked via `into_raw` at submission time, reclaimed here
            // exactly once per completion.
            let callback = unsafe { std::sync::Arc::from_raw(user_data as *const Callback) };
            callback.complete(cqe.result());

            if callback.is_exclusive() {
                exclusive.push(callback);
            } else if let Some(task) = callback.take_task() {
                // Goes through the task's own Idle->Scheduled CAS rather
                // than enqueuing unconditionally, so a task with two
                // concurrently pending wake sources (e.g. an I/O op racing
                // a timeout's `Sleep`) is never scheduled twice.
                task.wake_local(local, global);
            } else if let Some(waker) = callback.take_waker() {
                waker.wake();
            }
        }

        // Exclusive completions resume synchronously, after the CQ
        // cursor has been fully advanced, so a resumed task issuing a
        // new operation doesn't reenter iteration over `self.ring`.
        for callback in exclusive {
            if let Some(task) = callback.take_task() {
                ktrace!("exclusive completion resuming task {}", task.id());
                task.poll_once();
            } else if let Some(waker) = callback.take_waker() {
                waker.wake_by_ref();
            }
        }

        if processed {
            self.drain_waiting();
        }
        processed
    }

    /// Drain remaining completions so io_uring can release kernel
    /// resources without leaking inflight operations.
    pub fn shutdown(&mut self) {
        let local = LocalQueue::new(1);
        let global = GlobalQueue::new();
        while self.inflight > 0 {
            if self.ring.submit_and_wait(1).is_err() {
                break;
            }
            if !self.drain_completions(&local, &global) {
                break;
            }
        }
        kdebug!("driver shutdown with {} operations still inflight", self.inflight);
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.wake_fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tests::noop_task;
    use std::sync::Arc;

    #[test]
    fn new_driver_has_no_inflight_ops() {
        let driver = Driver::new(32, 4);
        // Building a ring requires io_uring support; skip gracefully
        // rather than failing in sandboxes without it.
        match driver {
            Ok(d) => assert_eq!(d.inflight(), 0),
            Err(_) => {}
        }
    }

    fn make_pipe() -> Option<(RawFd, RawFd)> {
        let mut fds = [0i32; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return None;
        }
        Some((fds[0], fds[1]))
    }

    /// A ring too small to hold every submitted read must defer the
    /// overflow to the waiting list instead of panicking or dropping it.
    #[test]
    fn ring_saturation_defers_overflow_to_waiting_list() {
        let mut driver = match Driver::new(2, 1) {
            Ok(d) => d,
            Err(_) => return,
        };
        let (read_fd, write_fd) = match make_pipe() {
            Some(fds) => fds,
            None => return,
        };

        let mut bufs: Vec<Box<[u8; 8]>> = Vec::new();
        for _ in 0..6 {
            let mut buf = Box::new([0u8; 8]);
            let cb = Callback::new(None, false);
            let user_data = Arc::into_raw(cb) as u64;
            let sqe = io_uring::opcode::Read::new(
                io_uring::types::Fd(read_fd),
                buf.as_mut_ptr(),
                8,
            )
            .build()
            .user_data(user_data);
            driver.submit(sqe);
            bufs.push(buf);
        }

        // A 2-entry ring (one slot already reserved for the wake-up read
        // once armed) cannot hold 6 fresh reads; some must still be
        // sitting in the waiting list.
        assert!(driver.waiting_len() > 0);

        // Satisfy every read and drain until nothing is left waiting or
        // inflight, reclaiming every leaked `Callback` along the way.
        let local = LocalQueue::new(4);
        let global = GlobalQueue::new();
        for _ in 0..bufs.len() {
            let _ = unsafe { libc::write(write_fd, [0u8; 8].as_ptr() as *const libc::c_void, 8) };
        }
        for _ in 0..64 {
            if driver.inflight() == 0 && driver.waiting_len() == 0 {
                break;
            }
            let _ = driver.poll(&local, &global);
        }
        assert_eq!(driver.waiting_len(), 0);
        assert_eq!(driver.inflight(), 0);

        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }

    /// An exclusive completion must resume its captured task synchronously,
    /// from inside the exclusive-drain phase, not via a queue push.
    #[test]
    fn exclusive_completion_resumes_task_via_poll_once() {
        let mut driver = match Driver::new(8, 1) {
            Ok(d) => d,
            Err(_) => return,
        };
        let (read_fd, write_fd) = match make_pipe() {
            Some(fds) => fds,
            None => return,
        };

        let task = noop_task(1);
        let mut buf = Box::new([0u8; 8]);
        let cb = Callback::new(Some(task.clone()), true);
        let user_data = Arc::into_raw(cb) as u64;
        let sqe = io_uring::opcode::Read::new(io_uring::types::Fd(read_fd), buf.as_mut_ptr(), 8)
            .build()
            .user_data(user_data);
        driver.submit(sqe);
        let _ = driver.force_submit();

        let _ = unsafe { libc::write(write_fd, [0u8; 8].as_ptr() as *const libc::c_void, 8) };

        let local = LocalQueue::new(4);
        let global = GlobalQueue::new();
        for _ in 0..64 {
            if driver.poll(&local, &global).unwrap_or(false) {
                break;
            }
        }

        // Resumed synchronously inside drain_completions, never by being
        // pushed onto either queue.
        assert!(local.pop().is_none());
        assert!(global.pop().is_none());
        assert_eq!(task.debug_id(), 1);

        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }
}
