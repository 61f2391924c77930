//! Subscriber setup for the binary. The library only emits `tracing` events,
//! each tagged with a `title` naming the operation that produced it.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LogSink {
    Stderr,
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: LogLevel,
    pub sink: LogSink,
}

/// Installs the global subscriber. `RUST_LOG` wins over `options.level`.
///
/// Records go through a non-blocking writer; keep the returned guard alive
/// until exit so buffered lines are flushed.
pub fn init(options: &LogOptions) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(options.level)));

    let (writer, guard, ansi) = match &options.sink {
        LogSink::Stderr => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
            (writer, guard, true)
        }
        LogSink::Stdout => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            (writer, guard, true)
        }
        LogSink::File(path) => {
            let (directory, file_name) = split_log_path(path)?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (writer, guard, false)
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_thread_names(true)
        .try_init()
        .map_err(|err| anyhow!("failed to install log subscriber: {err}"))?;
    Ok(guard)
}

fn default_directive(level: LogLevel) -> String {
    format!("countdown={}", level.as_str())
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf)> {
    let Some(file_name) = path.file_name() else {
        bail!("log file path {} has no file name", path.display());
    };
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((directory, PathBuf::from(file_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_maps_to_crate_directive() {
        assert_eq!(default_directive(LogLevel::Debug), "countdown=debug");
        assert_eq!(default_directive(LogLevel::Warn), "countdown=warn");
    }

    #[test]
    fn log_path_splits_into_directory_and_file() {
        let (dir, file) = split_log_path(Path::new("/var/log/countdown.log")).expect("valid");
        assert_eq!(dir, PathBuf::from("/var/log"));
        assert_eq!(file, PathBuf::from("countdown.log"));

        let (dir, file) = split_log_path(Path::new("countdown.log")).expect("valid");
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(file, PathBuf::from("countdown.log"));

        assert!(split_log_path(Path::new("/")).is_err());
    }
}
