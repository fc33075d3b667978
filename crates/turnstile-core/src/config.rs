//! Application configuration management.
//!
//! Configuration is assembled in layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, else the platform default path if present)
//! 3. Environment variables such as `TURNSTILE__STORE__DATA_DIR`
//!
//! Hour bucket keys are always computed in UTC. The configured timezone is
//! only used to render human-readable local times.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::retry::RetryPolicy;
use crate::store::{DocumentStore, FileStore, MemoryStore, StoreHandle, StoreResult};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The configuration could not be rendered as TOML.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// One or more values are out of range.
    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Which store backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// JSON documents under `data_dir`, shared between processes.
    File,
    /// Process-local; everything is lost on exit.
    Memory,
}

/// How the scanner gets a verdict for a decoded code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Call the orchestrator directly.
    InProcess,
    /// Run the `turnstile` CLI per code and parse its JSON line.
    Subprocess,
    /// POST to a running `turnstile-server`.
    Http,
}

/// Backing store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend to open.
    pub backend: StoreBackend,
    /// Root directory of the file backend.
    pub data_dir: PathBuf,
    /// Bound on every single store call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            data_dir: default_data_dir(),
            timeout_ms: 5_000,
        }
    }
}

/// HTTP service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,
    /// Use production logging (JSON files + compact stdout).
    pub production: bool,
    /// Directory for production log files. Platform default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            production: false,
            log_dir: None,
        }
    }
}

/// Scanner loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Ignore repeats of the same code within this many seconds.
    pub cooldown_secs: u64,
    /// Where validation happens.
    pub mode: DispatchMode,
    /// CLI executable used in `subprocess` mode.
    pub validator_path: PathBuf,
    /// Base URL of the HTTP service used in `http` mode.
    pub server_url: String,
    /// Append-only JSON-lines audit trail. Disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<PathBuf>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 3,
            mode: DispatchMode::InProcess,
            validator_path: PathBuf::from("turnstile"),
            server_url: "http://127.0.0.1:3000".to_string(),
            audit_log: None,
        }
    }
}

/// Facility-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// IANA timezone for human-readable output.
    pub timezone: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Backing store.
    #[serde(default)]
    pub store: StoreConfig,
    /// Transaction conflict retry.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// HTTP service.
    #[serde(default)]
    pub server: ServerConfig,
    /// Scanner loop.
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// Facility-level settings.
    #[serde(default)]
    pub system: SystemConfig,
}

impl TurnstileConfig {
    /// Load configuration from defaults, a TOML file and the environment.
    ///
    /// With `path = None` the platform default file is used if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit `path` does not exist, a source is
    /// malformed, or the merged values fail validation.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let file = match path {
            Some(p) if !p.exists() => return Err(ConfigError::NotFound(p.to_path_buf())),
            Some(p) => Some(p.to_path_buf()),
            None => Some(default_config_path()).filter(|p| p.exists()),
        };

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);
        if let Some(file) = &file {
            debug!(path = %file.display(), "loading configuration file");
            builder = builder.add_source(File::from(file.as_path()).format(FileFormat::Toml));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults, without the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check value ranges, collecting every problem found.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] listing all invalid fields.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.store.timeout_ms == 0 {
            errors.push("store.timeout_ms: must be greater than zero".to_string());
        }
        if self.store.backend == StoreBackend::File && self.store.data_dir.as_os_str().is_empty() {
            errors.push("store.data_dir: required for the file backend".to_string());
        }
        if self.retry.multiplier < 1.0 {
            errors.push("retry.multiplier: must be at least 1.0".to_string());
        }
        if self.retry.initial_delay > self.retry.max_delay {
            errors.push("retry.initial_delay_ms: must not exceed retry.max_delay_ms".to_string());
        }
        if self.server.bind.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "server.bind: '{}' is not a socket address",
                self.server.bind
            ));
        }
        if !(self.scanner.server_url.starts_with("http://")
            || self.scanner.server_url.starts_with("https://"))
        {
            errors.push("scanner.server_url: must be an http(s) URL".to_string());
        }
        if self.system.timezone.parse::<Tz>().is_err() {
            errors.push(format!(
                "system.timezone: '{}' is not an IANA timezone",
                self.system.timezone
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Configured display timezone. Falls back to UTC.
    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.system.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// Per-call store timeout.
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }

    /// Open the configured backend and wrap it in a [`StoreHandle`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file backend cannot create its directories.
    pub fn open_store(&self) -> StoreResult<StoreHandle> {
        let backend: Arc<dyn DocumentStore> = match self.store.backend {
            StoreBackend::File => Arc::new(FileStore::open(&self.store.data_dir)?),
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(StoreHandle::new(backend, self.store_timeout(), self.retry.clone()))
    }
}

/// Default configuration file location.
///
/// On the gate controller: `/etc/turnstile/config.toml`
/// For development: the platform config directory.
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/turnstile/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "turnstile")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("turnstile.toml"))
    }
}

/// Default data directory for the file backend.
///
/// On the gate controller: `/var/lib/turnstile`
/// For development: the platform data directory.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/lib/turnstile")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "turnstile")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("./data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TurnstileConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scanner.cooldown_secs, 3);
        assert_eq!(config.store.timeout_ms, 5_000);
        assert_eq!(config.timezone(), chrono_tz::UTC);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = TurnstileConfig::from_toml_str(
            r#"
            [store]
            backend = "memory"
            timeout_ms = 250

            [retry]
            max_retries = 3
            initial_delay_ms = 5

            [system]
            timezone = "America/Los_Angeles"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store_timeout(), Duration::from_millis(250));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(5));
        assert_eq!(config.timezone(), chrono_tz::America::Los_Angeles);
        // untouched sections keep their defaults
        assert_eq!(config.scanner.mode, DispatchMode::InProcess);
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = TurnstileConfig::default();
        config.store.timeout_ms = 0;
        config.server.bind = "not an address".to_string();
        config.system.timezone = "Mars/Olympus".to_string();

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.starts_with("system.timezone")));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = TurnstileConfig::load(Some(Path::new("/nonexistent/turnstile.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turnstile.toml");
        std::fs::write(&path, "[scanner]\ncooldown_secs = 10\nmode = \"http\"\n").unwrap();

        let config = TurnstileConfig::load(Some(&path)).unwrap();
        assert_eq!(config.scanner.cooldown_secs, 10);
        assert_eq!(config.scanner.mode, DispatchMode::Http);
    }

    #[test]
    fn test_to_toml_roundtrips() {
        let mut config = TurnstileConfig::default();
        config.scanner.audit_log = Some(PathBuf::from("/var/log/turnstile/audit.jsonl"));
        let text = config.to_toml().unwrap();
        let parsed = TurnstileConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let mut config = TurnstileConfig::default();
        config.store.backend = StoreBackend::Memory;
        let handle = config.open_store().unwrap();
        assert_eq!(handle.backend(), "memory");
    }
}
