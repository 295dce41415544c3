// Copyright (c) 2024-present, ixstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A process-wide log channel alongside the regular [`log`] facade.
//!
//! Every message this crate logs goes through both the ordinary [`log`]
//! macros (`log::debug!`, `log::info!`, ...), for embedders that already
//! set up a `log` subscriber, and a direct [`write_record`] call that
//! formats a `<level> <logger-name> <text>\n` record onto the write end of
//! a process-wide pipe, whose read end is handed out via [`log_fd`] for an
//! embedder that wants to multiplex this crate's diagnostics into a
//! supervisor that doesn't speak the `log` facade. The pipe write happens
//! unconditionally at the call site (see the crate-internal `log_debug!`/
//! `log_info!`/`log_error!` macros used throughout this crate) rather than
//! depending on [`PipeLogger`] being the installed global logger: `log`
//! permits exactly one global logger per process, so an embedder that has
//! already installed their own would otherwise never see this crate's
//! diagnostics land in the pipe at all.
//!
//! The pipe is created lazily, on first access, behind a [`OnceLock`].

use std::io::Write;
use std::os::unix::io::RawFd;
use std::os::unix::net::UnixStream;
use std::sync::{Mutex, OnceLock};

/// Severity levels carried in the formatted log-pipe record.
///
/// These mirror the distilled levels of the embedded store's own logging
/// facility rather than [`log::Level`]'s four variants, so FATAL and TRACE
/// survive the round trip even though `log` itself only distinguishes
/// Error/Warn/Info/Debug/Trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Level {
    /// Unrecoverable; the process is about to abort or has lost a
    /// durability guarantee.
    Fatal = 0,
    /// A fallible operation failed; check value.
    Error = 10,
    /// Noteworthy but not a failure.
    Warning = 20,
    /// High-level lifecycle events (env open/close, checkpoints).
    Info = 30,
    /// Per-call diagnostics.
    Debug = 40,
    /// Very chatty, per-byte/per-page diagnostics.
    Trace = 50,
}

impl Level {
    const fn name(self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warning,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

struct Pipe {
    write_end: Mutex<UnixStream>,
    read_end_fd: RawFd,
}

static PIPE: OnceLock<Pipe> = OnceLock::new();

fn pipe() -> &'static Pipe {
    PIPE.get_or_init(|| {
        let (write_end, read_end) =
            UnixStream::pair().expect("failed to create the process-wide log pipe");
        let read_end_fd = {
            use std::os::unix::io::IntoRawFd;
            read_end.into_raw_fd()
        };
        Pipe {
            write_end: Mutex::new(write_end),
            read_end_fd,
        }
    })
}

/// Returns the read end of the process-wide log pipe as a raw file
/// descriptor, creating the pipe on first call.
///
/// The embedder owns this descriptor once returned: this crate never reads
/// from it. Each call returns the same descriptor; the pipe is created
/// exactly once per process.
#[must_use]
pub fn log_fd() -> RawFd {
    pipe().read_end_fd
}

/// Writes one `<level> <logger-name> <text>\n` record to the log pipe.
/// Never panics on a full or closed pipe: a write failure is silently
/// dropped, since the log pipe is a diagnostics side-channel, not a
/// correctness-bearing path.
pub fn write_record(level: Level, logger: &str, text: &str) {
    let mut buf = [0_u8; 512];
    let mut cursor = &mut buf[..];
    let written = {
        let start_len = cursor.len();
        let _ = write!(cursor, "{} {logger} {text}\n", level.name());
        start_len - cursor.len()
    };
    if let Ok(mut write_end) = pipe().write_end.lock() {
        let _ = write_end.write_all(&buf[..written]);
    }
}

/// A minimal [`log::Log`] implementation that writes every record it
/// receives into the process-wide pipe.
///
/// This crate's own diagnostics reach the pipe unconditionally (via
/// [`write_record`] called directly at each internal call site) whether or
/// not `PipeLogger` is installed; installing it as well is only useful to
/// also capture records logged by *other* crates sharing the process's
/// `log` facade. Since `log::set_logger` permits exactly one global
/// logger, installing `PipeLogger` replaces whatever logger was there
/// before — it does not chain to it. Don't install this alongside another
/// subscriber you want to keep: they can't coexist as the global logger.
pub struct PipeLogger;

/// The single [`PipeLogger`] instance, suitable for [`log::set_logger`].
pub static PIPE_LOGGER: PipeLogger = PipeLogger;

impl log::Log for PipeLogger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        write_record(
            record.level().into(),
            record.target(),
            &record.args().to_string(),
        );
    }

    fn flush(&self) {}
}

/// Installs [`PIPE_LOGGER`] as the global `log` logger at the given max
/// level. Only useful to pipe records logged by crates *other* than this
/// one; this crate's own diagnostics reach [`log_fd`]'s pipe regardless,
/// since every internal call site writes to it directly. Skip this if the
/// embedder already has its own `log` subscriber installed — `install`
/// would replace it, not supplement it.
///
/// # Errors
///
/// Returns `Err` if a logger is already installed, per
/// [`log::set_logger`]'s contract.
pub fn install(max_level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_logger(&PIPE_LOGGER)?;
    log::set_max_level(max_level);
    Ok(())
}

/// Logs at [`log::Level::Debug`] through both the `log` facade and the
/// process-wide pipe, unconditionally.
macro_rules! log_debug {
    (target: $target:expr, $($arg:tt)+) => {{
        log::debug!(target: $target, $($arg)+);
        $crate::log_pipe::write_record($crate::log_pipe::Level::Debug, $target, &format!($($arg)+));
    }};
}

/// Logs at [`log::Level::Info`] through both the `log` facade and the
/// process-wide pipe, unconditionally.
macro_rules! log_info {
    (target: $target:expr, $($arg:tt)+) => {{
        log::info!(target: $target, $($arg)+);
        $crate::log_pipe::write_record($crate::log_pipe::Level::Info, $target, &format!($($arg)+));
    }};
}

/// Logs at [`log::Level::Error`] through both the `log` facade and the
/// process-wide pipe, unconditionally.
macro_rules! log_error {
    (target: $target:expr, $($arg:tt)+) => {{
        log::error!(target: $target, $($arg)+);
        $crate::log_pipe::write_record($crate::log_pipe::Level::Error, $target, &format!($($arg)+));
    }};
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
