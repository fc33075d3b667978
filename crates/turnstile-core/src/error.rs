//! Unified error types for the turnstile core library.
//!
//! [`TurnstileError`] covers every failure mode callers at the process
//! boundary (CLI, HTTP service, scanner) need to tell apart. Modules keep
//! their own narrower error types ([`StoreError`], [`ConfigError`]) and
//! convert into this one.
//!
//! Rejected codes are deliberately absent: an expired or unknown code is an
//! [`Outcome`](crate::types::Outcome), not an error.
//!
//! # Example
//!
//! ```rust
//! use turnstile_core::error::{Result, TurnstileError};
//! use turnstile_core::HourKey;
//!
//! fn parse(key: &str) -> Result<HourKey> {
//!     key.parse()
//! }
//!
//! assert!(matches!(parse("yesterday"), Err(TurnstileError::InvalidHourKey(_))));
//! ```

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::types::EventType;

/// The unified error type for all turnstile operations.
#[derive(Debug, Error)]
pub enum TurnstileError {
    // =========================================================================
    // STORE ERRORS
    // =========================================================================
    /// The backing store could not be reached or refused the call.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A store call did not complete within the configured timeout.
    #[error("Store call timed out after {timeout_ms} ms")]
    StoreTimeout {
        /// Configured per-call timeout.
        timeout_ms: u64,
    },

    /// A write timed out after it may already have been applied.
    ///
    /// For a code redemption this means the code may be consumed even though
    /// no verdict was reached. Reading the code again settles it.
    #[error("Write to '{key}' unacknowledged after {timeout_ms} ms; it may have been applied")]
    CommitOutcomeUnknown {
        /// Document key the write targeted.
        key: String,
        /// Configured per-call timeout.
        timeout_ms: u64,
    },

    /// A transaction kept conflicting with concurrent writers.
    #[error("Transaction on '{key}' gave up after {attempts} conflicting attempts")]
    TransactionExhausted {
        /// Document key the transaction targeted.
        key: String,
        /// Attempts made before giving up.
        attempts: usize,
    },

    /// A stored document could not be decoded.
    #[error("Corrupt document: {0}")]
    CorruptDocument(String),

    // =========================================================================
    // REDEMPTION ERRORS
    // =========================================================================
    /// The code was accepted and consumed, but a follow-up update failed.
    ///
    /// The code cannot be un-consumed; the effects of this redemption are
    /// only partially recorded.
    #[error("Code for user '{user_id}' ({event_type}) was consumed but {stage} failed: {message}")]
    DownstreamFailure {
        /// Owner of the consumed code.
        user_id: String,
        /// Direction of the consumed code.
        event_type: EventType,
        /// Which follow-up failed (`stats` or `occupancy`).
        stage: &'static str,
        /// Underlying failure.
        message: String,
    },

    // =========================================================================
    // REQUEST ERRORS
    // =========================================================================
    /// An hour bucket key was not in `YYYY-MM-DD-HH` form.
    #[error("Invalid hour key: '{0}'. Expected 'YYYY-MM-DD-HH' in UTC (e.g., '2025-01-15-09').")]
    InvalidHourKey(String),

    /// A calendar date was not in `YYYY-MM-DD` form.
    #[error("Invalid date: '{0}'. Expected 'YYYY-MM-DD' (e.g., '2025-01-15').")]
    InvalidDate(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // I/O ERRORS
    // =========================================================================
    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;

impl TurnstileError {
    /// Returns `true` if the backing store is the cause.
    #[inline]
    #[must_use]
    pub const fn is_store_error(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_)
                | Self::StoreTimeout { .. }
                | Self::CommitOutcomeUnknown { .. }
                | Self::TransactionExhausted { .. }
                | Self::CorruptDocument(_)
        )
    }

    /// Returns `true` if a write may or may not have been applied.
    #[inline]
    #[must_use]
    pub const fn is_outcome_unknown(&self) -> bool {
        matches!(self, Self::CommitOutcomeUnknown { .. })
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if the caller supplied bad input.
    #[inline]
    #[must_use]
    pub const fn is_request_error(&self) -> bool {
        matches!(self, Self::InvalidHourKey(_) | Self::InvalidDate(_))
    }

    /// Returns `true` if retrying the same call later may succeed.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::StoreTimeout { .. } | Self::TransactionExhausted { .. }
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidHourKey(_) | Self::InvalidDate(_) => 400,

            Self::ConfigNotFound(_) => 404,

            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            Self::CorruptDocument(_) | Self::DownstreamFailure { .. } | Self::IoError(_) => 500,

            Self::StoreUnavailable(_)
            | Self::StoreTimeout { .. }
            | Self::CommitOutcomeUnknown { .. }
            | Self::TransactionExhausted { .. } => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::StoreTimeout { .. } => "STORE_TIMEOUT",
            Self::CommitOutcomeUnknown { .. } => "COMMIT_OUTCOME_UNKNOWN",
            Self::TransactionExhausted { .. } => "TRANSACTION_EXHAUSTED",
            Self::CorruptDocument(_) => "CORRUPT_DOCUMENT",
            Self::DownstreamFailure { .. } => "DOWNSTREAM_FAILURE",
            Self::InvalidHourKey(_) => "INVALID_HOUR_KEY",
            Self::InvalidDate(_) => "INVALID_DATE",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<StoreError> for TurnstileError {
    fn from(err: StoreError) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        match err {
            StoreError::Unavailable(message) => Self::StoreUnavailable(message),
            StoreError::Timeout(after) => Self::StoreTimeout {
                timeout_ms: after.as_millis() as u64,
            },
            StoreError::CommitOutcomeUnknown { key, after, .. } => Self::CommitOutcomeUnknown {
                key,
                timeout_ms: after.as_millis() as u64,
            },
            StoreError::RetriesExhausted { key, attempts, .. } => {
                Self::TransactionExhausted { key, attempts }
            }
            StoreError::Decode {
                collection,
                key,
                message,
            } => Self::CorruptDocument(format!("{collection}/{key}: {message}")),
            StoreError::Io(e) => Self::StoreUnavailable(e.to_string()),
        }
    }
}

impl From<ConfigError> for TurnstileError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::Load(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::Serialize(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::Validation(errors) => Self::ConfigValidationError(errors.join("; ")),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use std::io::{Error as IoErr, ErrorKind};
    use std::time::Duration;

    use super::*;
    use crate::store::Collection;

    #[test]
    fn test_store_error_classification() {
        assert!(TurnstileError::StoreUnavailable("down".into()).is_store_error());
        assert!(TurnstileError::StoreTimeout { timeout_ms: 5000 }.is_store_error());
        assert!(TurnstileError::CorruptDocument("x".into()).is_store_error());
        assert!(!TurnstileError::InvalidHourKey("x".into()).is_store_error());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(TurnstileError::StoreTimeout { timeout_ms: 1 }.is_recoverable());
        assert!(TurnstileError::TransactionExhausted {
            key: "2025-01-01-00".into(),
            attempts: 6
        }
        .is_recoverable());
        assert!(!TurnstileError::CorruptDocument("x".into()).is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(TurnstileError::InvalidHourKey("x".into()).http_status_code(), 400);
        assert_eq!(TurnstileError::InvalidDate("x".into()).http_status_code(), 400);
        assert_eq!(TurnstileError::StoreUnavailable("x".into()).http_status_code(), 503);
        assert_eq!(TurnstileError::CorruptDocument("x".into()).http_status_code(), 500);
        assert_eq!(
            TurnstileError::ConfigValidationError("x".into()).http_status_code(),
            422
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TurnstileError::StoreTimeout { timeout_ms: 1 }.error_code(),
            "STORE_TIMEOUT"
        );
        assert_eq!(
            TurnstileError::InvalidHourKey("x".into()).error_code(),
            "INVALID_HOUR_KEY"
        );
    }

    #[test]
    fn test_from_store_error() {
        let err: TurnstileError = StoreError::Timeout(Duration::from_millis(250)).into();
        assert!(matches!(err, TurnstileError::StoreTimeout { timeout_ms: 250 }));

        let err: TurnstileError = StoreError::RetriesExhausted {
            collection: Collection::HourlyStats,
            key: "2025-01-01-00".into(),
            attempts: 3,
        }
        .into();
        assert!(matches!(err, TurnstileError::TransactionExhausted { attempts: 3, .. }));

        let err: TurnstileError = StoreError::CommitOutcomeUnknown {
            collection: Collection::AccessCodes,
            key: "ABC123".into(),
            after: Duration::from_millis(50),
        }
        .into();
        assert!(err.is_outcome_unknown());
        assert!(!err.is_recoverable());
        assert_eq!(err.error_code(), "COMMIT_OUTCOME_UNKNOWN");

        let err: TurnstileError = StoreError::Io(IoErr::new(ErrorKind::PermissionDenied, "no")).into();
        assert!(err.is_store_error());
    }

    #[test]
    fn test_from_config_error() {
        let err: TurnstileError =
            ConfigError::Validation(vec!["a".into(), "b".into()]).into();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("a; b"));
    }

    #[test]
    fn test_downstream_failure_message_names_stage() {
        let err = TurnstileError::DownstreamFailure {
            user_id: "u1".into(),
            event_type: EventType::Enter,
            stage: "stats",
            message: "timed out".into(),
        };
        let text = err.to_string();
        assert!(text.contains("u1"));
        assert!(text.contains("ENTER"));
        assert!(text.contains("stats failed"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<TurnstileError>();
        assert_sync::<TurnstileError>();
    }
}
