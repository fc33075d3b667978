//! Logging setup for the server.
//!
//! Two layouts:
//! - production: daily JSON files for later audit, plus compact stdout for the journal
//! - development: pretty stdout with span timings
//!
//! The filter comes from `RUST_LOG`, else `TURNSTILE_LOG_LEVEL`, else `info`.
//! Redemption events carry `code` only as a redacted hint, so the JSON files
//! are safe to keep.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use turnstile_core::ServerConfig;

/// File name prefix of the rolling JSON logs.
const LOG_FILE_PREFIX: &str = "turnstile-server";

/// Keeps the background log writers alive. Drop it last.
#[must_use = "dropping the guard stops log output"]
#[derive(Debug, Default)]
pub struct LogGuard {
    _writers: Vec<WorkerGuard>,
}

/// Install the global subscriber for `server`'s settings.
///
/// `force_production` overrides `server.production` (the `--production` flag).
///
/// # Errors
///
/// Returns an error if the env filter cannot be parsed or the log
/// directory cannot be created.
pub fn init(server: &ServerConfig, force_production: bool) -> anyhow::Result<LogGuard> {
    let log_level = std::env::var("TURNSTILE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    if server.production || force_production {
        let dir = server.log_dir.clone().unwrap_or_else(default_log_dir);
        init_production(env_filter, &dir)
    } else {
        init_development(env_filter);
        Ok(LogGuard::default())
    }
}

fn init_production(env_filter: EnvFilter, dir: &Path) -> anyhow::Result<LogGuard> {
    std::fs::create_dir_all(dir)?;

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(file_writer)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(stdout_writer)
                .with_ansi(false),
        )
        .init();

    Ok(LogGuard {
        _writers: vec![file_guard, stdout_guard],
    })
}

fn init_development(env_filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        )
        .init();
}

/// `/var/log/turnstile` on Linux, the platform data dir elsewhere.
pub fn default_log_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        return PathBuf::from("/var/log/turnstile");
    }
    directories::ProjectDirs::from("", "", "turnstile")
        .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_dir_names_the_service() {
        let dir = default_log_dir();
        assert!(dir.to_string_lossy().contains("turnstile") || dir.ends_with("logs"));
    }
}
