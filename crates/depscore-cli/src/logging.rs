//! Tracing setup.
//!
//! Console output goes to stderr so stdout stays free for the stdio
//! protocol stream. Two files are written in the log directory: one with
//! everything at the active level and one with errors only.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const LOG_FILE: &str = "depscore-mcp.log";
pub const ERROR_LOG_FILE: &str = "depscore-mcp-error.log";

/// Flushes the file writers when dropped. Hold it for the life of `main`.
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
pub fn env_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn file_writer(dir: &Path, name: &str) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .with_context(|| format!("Failed to open log file {}", dir.join(name).display()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber.
pub fn init(verbose: bool, dir: &Path) -> anyhow::Result<LogGuards> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let (log_writer, log_guard) = file_writer(dir, LOG_FILE)?;
    let (error_writer, error_guard) = file_writer(dir, ERROR_LOG_FILE)?;

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(fmt::layer().with_writer(log_writer).with_ansi(false))
        .with(
            fmt::layer()
                .with_writer(error_writer)
                .with_ansi(false)
                .with_filter(LevelFilter::ERROR),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuards {
        _guards: vec![log_guard, error_guard],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_writer_creates_named_file() {
        let dir = tempfile::tempdir().unwrap();

        let (mut writer, guard) = file_writer(dir.path(), ERROR_LOG_FILE).unwrap();
        writer.write_all(b"boom\n").unwrap();
        drop(writer);
        drop(guard);

        let contents = std::fs::read_to_string(dir.path().join(ERROR_LOG_FILE)).unwrap();
        assert_eq!(contents, "boom\n");
    }

    #[test]
    fn test_verbose_filter_default() {
        if std::env::var("RUST_LOG").is_err() {
            assert_eq!(env_filter(true).to_string(), "debug");
            assert_eq!(env_filter(false).to_string(), "info");
        }
    }
}
