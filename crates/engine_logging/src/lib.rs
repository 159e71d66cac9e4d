#![deny(missing_docs)]
//! Shared logging utilities for the extraction workspace.
//!
//! This crate provides the `engine_*` logging macros used across the codebase
//! and the initializers for the global logger in tests and worker processes.

use std::cell::Cell;

thread_local! {
    /// Thread-local storage for the chunk the current thread is working on.
    static CHUNK_CONTEXT: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Tags log lines emitted by the current thread with a chunk id.
/// Worker loops call this once before they start reading records.
pub fn set_chunk_context(chunk: Option<usize>) {
    CHUNK_CONTEXT.with(|v| v.set(chunk));
}

/// Retrieves the chunk id tagged on the current thread, if any.
pub fn chunk_context() -> Option<usize> {
    CHUNK_CONTEXT.with(|v| v.get())
}

/// Dispatches to the `log` macro of the given level, adding the chunk tag.
#[doc(hidden)]
#[macro_export]
macro_rules! __engine_log {
    ($level:ident, $($arg:tt)*) => {{
        match $crate::chunk_context() {
            Some(chunk) => log::$level!("[chunk {}] {}", chunk, format_args!($($arg)*)),
            None => log::$level!($($arg)*),
        }
    }};
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! engine_trace {
    ($($arg:tt)*) => {{
        $crate::__engine_log!(trace, $($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! engine_info {
    ($($arg:tt)*) => {{
        $crate::__engine_log!(info, $($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! engine_debug {
    ($($arg:tt)*) => {{
        $crate::__engine_log!(debug, $($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! engine_warn {
    ($($arg:tt)*) => {{
        $crate::__engine_log!(warn, $($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! engine_error {
    ($($arg:tt)*) => {{
        $crate::__engine_log!(error, $($arg)*);
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

/// Initializes logging for a worker process.
///
/// Stdout of a worker carries the report protocol, so every log line goes to
/// stderr, which the controller leaves attached to its own terminal.
pub fn initialize_for_worker(level: log::LevelFilter) {
    use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(log::LevelFilter::Error)
        .build();

    let _ = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Never);
}
