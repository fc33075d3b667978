//! Logging setup for the CLI.
//!
//! Everything goes to stderr. In one-shot mode stdout must carry exactly one
//! line, the JSON result, because the caller parses the last stdout line.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize stderr logging.
///
/// `quiet` lowers the default level to `warn` so interactive sessions are
/// not drowned in redemption logs. `RUST_LOG` or `TURNSTILE_LOG_LEVEL`
/// always win.
///
/// # Errors
///
/// Returns an error if the env filter cannot be parsed.
pub fn init(quiet: bool) -> anyhow::Result<()> {
    let default_level = if quiet { "warn" } else { "info" };
    let log_level =
        std::env::var("TURNSTILE_LOG_LEVEL").unwrap_or_else(|_| default_level.to_string());

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();

    Ok(())
}
