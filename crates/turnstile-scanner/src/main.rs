//! # turnstile-scanner
//!
//! Door-side loop between a barcode decoder and the validator.
//!
//! Reads decoded codes from stdin, one per line (`zbarcam --raw` or plain
//! `QR-Code:` prefixed output both work), drops repeats inside the cooldown
//! window, obtains a verdict and prints it.
//!
//! ```bash
//! zbarcam --nodisplay /dev/video0 | turnstile-scanner --config /etc/turnstile/config.toml
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use turnstile_core::{code_hint, scan, ScanDebouncer, TurnstileConfig};

use crate::audit::{AuditLog, AuditRecord};
use crate::dispatch::Dispatcher;

mod audit;
mod dispatch;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "turnstile-scanner", version, about = "Validate decoded access codes read from stdin")]
struct Args {
    /// Configuration file (defaults to the platform location if present).
    #[arg(short, long, env = "TURNSTILE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the repeat cooldown in seconds.
    #[arg(long)]
    cooldown: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging()?;

    let config = TurnstileConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    let dispatcher = Dispatcher::from_config(&config, args.config.as_deref())?;
    let audit = config.scanner.audit_log.clone().map(AuditLog::new);
    let cooldown = Duration::from_secs(args.cooldown.unwrap_or(config.scanner.cooldown_secs));

    info!(
        mode = dispatcher.mode(),
        cooldown_secs = cooldown.as_secs(),
        audit = ?audit.as_ref().map(AuditLog::path),
        "scanner ready"
    );

    tokio::select! {
        result = scan_loop(&dispatcher, audit.as_ref(), &config, cooldown) => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    info!("scanner stopped");
    Ok(())
}

/// Process decoder lines until end of input.
async fn scan_loop(
    dispatcher: &Dispatcher,
    audit: Option<&AuditLog>,
    config: &TurnstileConfig,
    cooldown: Duration,
) -> anyhow::Result<()> {
    let tz = config.timezone();
    let mut debouncer = ScanDebouncer::new(cooldown);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let Some(code) = scan::normalize(&line) else {
            continue;
        };
        if !debouncer.admit(code) {
            debug!(code = %code_hint(code), "repeat inside cooldown, skipped");
            continue;
        }

        let scanned_at = Utc::now();
        let (is_valid, reason) = match dispatcher.validate(code).await {
            Ok(response) => (response.is_valid, response.reason_str()),
            Err(e) => {
                warn!(code = %code_hint(code), error = %e, "no verdict, denying");
                (false, "dispatch_failed")
            }
        };

        if is_valid {
            println!("CODE VALID - Access granted");
        } else {
            println!("CODE INVALID - Access denied");
        }
        info!(code = %code_hint(code), is_valid, reason, "scan handled");

        if let Some(audit) = audit {
            let record = AuditRecord::new(code, scanned_at, tz, is_valid, reason);
            if let Err(e) = audit.append(&record).await {
                warn!(path = %audit.path().display(), error = %e, "failed to write audit record");
            }
        }
    }

    Ok(())
}

/// Compact logs on stderr; stdout carries only the verdict lines.
fn init_logging() -> anyhow::Result<()> {
    let log_level = std::env::var("TURNSTILE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
    Ok(())
}
