//! Kernel-style leveled logging macros.
//!
//! Thread-safe, context-aware debug output for the scheduler, driver and
//! timer wheel. Automatically tags each line with the current worker id
//! and an optional timestamp; there is no `println!` left anywhere else
//! in the runtime.
//!
//! # Environment Variables
//!
//! - `RT_FLUSH_EPRINT=1` - flush stderr after each line (useful around crashes)
//! - `RT_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//! - `RT_LOG_TIME=1` - include a nanosecond timestamp in output
//!
//! # Output Format
//!
//! `[LEVEL] [w<worker>] message`, or with a timestamp: `[LEVEL] [<ns>] [w<worker>] message`.
//!
//! # Usage
//!
//! ```ignore
//! use ringrt_core::{kdebug, kinfo, kwarn, kerror};
//!
//! kdebug!("submitted op user_data={}", corr);
//! kwarn!("submission queue full, queued for retry");
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;

use crate::env::env_get_bool;

/// Log levels, most to least severe.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static TIME_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize logging from the environment. Called lazily on first use;
/// exposed so a binary can call it explicitly for deterministic startup.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    START_TIME.get_or_init(Instant::now);
    FLUSH_ENABLED.store(env_get_bool("RT_FLUSH_EPRINT", false), Ordering::Relaxed);
    TIME_ENABLED.store(env_get_bool("RT_LOG_TIME", false), Ordering::Relaxed);

    if let Ok(val) = std::env::var("RT_LOG_LEVEL") {
        let level = match val.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => LogLevel::Info,
        };
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

#[inline]
pub fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn time_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    TIME_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

#[inline]
pub fn elapsed_ns() -> u64 {
    let start = START_TIME.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}

thread_local! {
    static WORKER_ID: std::cell::Cell<Option<u32>> = const { std::cell::Cell::new(None) };
}

/// Tag this OS thread as running worker `id` (called once from the
/// worker's thread entry point).
pub fn set_worker_id(id: u32) {
    WORKER_ID.with(|w| w.set(Some(id)));
}

pub fn clear_worker_id() {
    WORKER_ID.with(|w| w.set(None));
}

#[inline]
pub fn get_worker_id() -> Option<u32> {
    WORKER_ID.with(|w| w.get())
}

fn format_context() -> String {
    match get_worker_id() {
        Some(id) => format!("[w{}]", id),
        None => "[w--]".to_string(),
    }
}

#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }

    let stderr = std::io::stderr();
    let mut handle = stderr.lock();

    let _ = write!(handle, "{} ", level.prefix());
    if time_enabled() {
        let _ = write!(handle, "[{}] ", elapsed_ns());
    }
    let _ = write!(handle, "{} ", format_context());
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");

    if flush_enabled() {
        let _ = handle.flush();
    }
}

/// Error level log with worker context.
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::log::_klog_impl($crate::log::LogLevel::Error, format_args!($($arg)*));
    }};
}

/// Warning level log with worker context.
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::log::_klog_impl($crate::log::LogLevel::Warn, format_args!($($arg)*));
    }};
}

/// Info level log with worker context.
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::log::_klog_impl($crate::log::LogLevel::Info, format_args!($($arg)*));
    }};
}

/// Debug level log with worker context.
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::log::_klog_impl($crate::log::LogLevel::Debug, format_args!($($arg)*));
    }};
}

/// Trace level log with worker context.
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::log::_klog_impl($crate::log::LogLevel::Trace, format_args!($($arg)*));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels_order() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn level_from_u8() {
        assert_eq!(LogLevel::from_u8(0), LogLevel::Off);
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }

    #[test]
    fn worker_context_roundtrip() {
        assert_eq!(get_worker_id(), None);
        set_worker_id(3);
        assert_eq!(get_worker_id(), Some(3));
        clear_worker_id();
        assert_eq!(get_worker_id(), None);
    }

    #[test]
    fn macros_compile() {
        set_log_level(LogLevel::Off);
        kerror!("error {}", "msg");
        kwarn!("warn");
        kinfo!("info");
        kdebug!("debug {}", 1);
        ktrace!("trace");
    }
}
