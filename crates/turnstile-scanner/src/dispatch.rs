//! Getting a verdict for a decoded code.
//!
//! Three ways, chosen by `scanner.mode`:
//!
//! - `in_process`: call the [`Orchestrator`] directly
//! - `subprocess`: run the `turnstile` CLI once per code and parse its last stdout line
//! - `http`: POST to a running `turnstile-server`
//!
//! Every failure to obtain a verdict is a [`DispatchError`]; the caller
//! treats it as "access denied". In-process store errors are not dispatch
//! failures: they come back as a `store_error` or `outcome_unknown` verdict.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};
use turnstile_core::{
    code_hint, DispatchMode, Orchestrator, ProtocolError, TurnstileConfig, ValidationResponse,
};
use url::Url;

/// Bound on one validator run or HTTP round trip.
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Why no verdict could be obtained.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to start validator: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("validator exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered HTTP {0}")]
    Status(u16),

    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),

    #[error("validation timed out after {0:?}")]
    Timeout(Duration),
}

/// Where scans are sent for validation.
#[derive(Debug)]
pub enum Dispatcher {
    InProcess(Orchestrator),
    Subprocess {
        program: PathBuf,
        config: Option<PathBuf>,
    },
    Http {
        client: reqwest::Client,
        endpoint: Url,
    },
}

impl Dispatcher {
    /// Build the dispatcher selected by `config.scanner.mode`.
    ///
    /// `config_path` is forwarded to the CLI in subprocess mode so both
    /// processes read the same settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened, the server URL is
    /// invalid, or the HTTP client cannot be built.
    pub fn from_config(config: &TurnstileConfig, config_path: Option<&Path>) -> anyhow::Result<Self> {
        let dispatcher = match config.scanner.mode {
            DispatchMode::InProcess => Self::InProcess(Orchestrator::new(config.open_store()?)),
            DispatchMode::Subprocess => Self::Subprocess {
                program: config.scanner.validator_path.clone(),
                config: config_path.map(Path::to_path_buf),
            },
            DispatchMode::Http => Self::Http {
                client: reqwest::Client::builder().timeout(DISPATCH_TIMEOUT).build()?,
                endpoint: redeem_endpoint(&config.scanner.server_url)?,
            },
        };
        Ok(dispatcher)
    }

    /// Short name for logs.
    pub const fn mode(&self) -> &'static str {
        match self {
            Self::InProcess(_) => "in_process",
            Self::Subprocess { .. } => "subprocess",
            Self::Http { .. } => "http",
        }
    }

    /// Obtain a verdict for `code`.
    ///
    /// # Errors
    ///
    /// See [`DispatchError`].
    #[instrument(skip_all, fields(mode = self.mode(), code = %code_hint(code)))]
    pub async fn validate(&self, code: &str) -> Result<ValidationResponse, DispatchError> {
        match self {
            Self::InProcess(orchestrator) => {
                let redemption = orchestrator.process_code(code).await;
                Ok(ValidationResponse::from(&redemption))
            }
            Self::Subprocess { program, config } => {
                let mut command = Command::new(program);
                if let Some(path) = config {
                    command.arg("--config").arg(path);
                }
                // `--` keeps codes starting with '-' from being read as flags.
                command.arg("--").arg(code).kill_on_drop(true);

                let output = tokio::time::timeout(DISPATCH_TIMEOUT, command.output())
                    .await
                    .map_err(|_| DispatchError::Timeout(DISPATCH_TIMEOUT))??;
                interpret_output(&output)
            }
            Self::Http { client, endpoint } => {
                let response = client
                    .post(endpoint.clone())
                    .json(&serde_json::json!({ "code": code }))
                    .send()
                    .await?;

                let status = response.status();
                debug!(status = status.as_u16(), "server answered");
                if !status.is_success() {
                    return Err(DispatchError::Status(status.as_u16()));
                }
                Ok(response.json::<ValidationResponse>().await?)
            }
        }
    }
}

/// `{server_url}/api/codes/redeem`.
///
/// # Errors
///
/// Returns an error if `server_url` is not an absolute URL.
pub fn redeem_endpoint(server_url: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(server_url)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("api/codes/redeem")
}

/// Map a finished validator process to a verdict.
fn interpret_output(output: &Output) -> Result<ValidationResponse, DispatchError> {
    if !output.status.success() {
        return Err(DispatchError::ExitStatus {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(ValidationResponse::parse_last_line(&stdout)?)
}
