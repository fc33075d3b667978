//! # turnstile
//!
//! Command-line validator for the turnstile access-control system.
//!
//! ## Usage
//!
//! ```bash
//! # Interactive: read codes until "exit"
//! turnstile
//!
//! # One-shot: redeem a code and print a single JSON line
//! turnstile ABC123
//! {"is_valid":true,"user_id":"u1","event_type":"ENTER","reason":"accepted"}
//! ```
//!
//! The exit status reflects whether the attempt could be made, not whether
//! the code was valid; the JSON carries the outcome. Logs go to stderr.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use turnstile_core::{Orchestrator, StoreBackend, TurnstileConfig, ValidationResponse};

mod logging;
mod render;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about = "Redeem turnstile access codes")]
struct Args {
    /// Code to redeem. Omit for the interactive prompt.
    code: Option<String>,

    /// Configuration file (defaults to the platform location if present).
    #[arg(short, long, env = "TURNSTILE_CONFIG")]
    config: Option<PathBuf>,

    /// Use a throwaway in-memory store instead of the configured backend.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.code.is_none())?;

    let mut config = TurnstileConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if args.dry_run {
        config.store.backend = StoreBackend::Memory;
    }
    let store = config.open_store().context("failed to open store")?;
    debug!(backend = store.backend(), "store ready");
    let orchestrator = Orchestrator::new(store);

    match args.code {
        Some(code) => one_shot(&orchestrator, &code).await,
        None => interactive(&orchestrator, &config).await,
    }
}

/// Redeem one code and print the JSON result as the only stdout line.
async fn one_shot(orchestrator: &Orchestrator, code: &str) -> anyhow::Result<()> {
    let redemption = orchestrator.process_code(code).await;
    let line = ValidationResponse::from(&redemption).to_line()?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

/// Prompt for codes until `exit` or end of input.
async fn interactive(orchestrator: &Orchestrator, config: &TurnstileConfig) -> anyhow::Result<()> {
    let tz = config.timezone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("=== turnstile code validator ===");
    println!("Enter 'exit' to quit");

    loop {
        print!("\nEnter code to validate: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let code = line.trim();
        if code.eq_ignore_ascii_case("exit") {
            println!("Exiting");
            break;
        }

        let now = Utc::now();
        let redemption = orchestrator.process_code_at(code, now).await;
        println!("{}", render::describe(&redemption, now, tz));
    }

    Ok(())
}
