//! Compile-time default values for the runtime's tunables.

/// Default ring (submission/completion queue) entries per worker.
pub const RING_ENTRIES: u32 = 1024;

/// Default `io_uring_setup` flags.
pub const RING_FLAGS: u32 = 0;

/// Ready-task resumptions between forced submission flushes.
pub const SUBMIT_INTERVAL: u32 = 4;

/// Local-queue pops between driver completion checks.
pub const CHECK_IO_INTERVAL: u32 = 61;

/// Local-queue pops between global-queue checks.
pub const CHECK_GLOBAL_INTERVAL: u32 = 61;

/// Per-worker local ready-queue capacity.
pub const LOCAL_QUEUE_CAPACITY: usize = 256;

/// Timer wheel levels.
pub const TIMER_LEVELS: usize = 6;

/// Timer wheel slots per level.
pub const TIMER_SLOTS_PER_LEVEL: usize = 64;

/// Default worker count: the machine's available parallelism.
pub fn num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
