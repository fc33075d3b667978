//! Line-oriented JSON result protocol.
//!
//! A validation result is one JSON object on one line:
//!
//! ```json
//! {"is_valid":true,"user_id":"u1","event_type":"ENTER","reason":"accepted"}
//! ```
//!
//! Producers write it as the final line of stdout; consumers take the last
//! non-empty line and parse it. `reason` is optional when reading so that
//! results from older producers still parse.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::orchestrator::Redemption;
use crate::types::{EventType, RejectReason};

/// Errors reading a result line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The producer wrote nothing.
    #[error("validator produced no output")]
    EmptyOutput,

    /// The last line was not a result object.
    #[error("last output line is not a validation result: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Why a redemption ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResultReason {
    /// Code consumed and all follow-ups recorded.
    Accepted,
    /// Nothing was scanned or typed.
    EmptyInput,
    /// No such code, or it was already used.
    NotFound,
    /// The code record is missing required fields.
    Malformed,
    /// The code was past its expiry and has been removed.
    Expired,
    /// The store failed before the code was consumed.
    StoreError,
    /// The consuming write timed out; the code may or may not be used up.
    OutcomeUnknown,
    /// Code consumed, but stats or occupancy could not be updated.
    DownstreamFailure,
    /// A reason this build does not know.
    #[serde(other)]
    Unknown,
}

impl ResultReason {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::EmptyInput => "empty_input",
            Self::NotFound => "not_found",
            Self::Malformed => "malformed",
            Self::Expired => "expired",
            Self::StoreError => "store_error",
            Self::OutcomeUnknown => "outcome_unknown",
            Self::DownstreamFailure => "downstream_failure",
            Self::Unknown => "unknown",
        }
    }
}

/// The validation result sent back to scanners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    /// Whether the code was valid and has been consumed.
    pub is_valid: bool,
    /// Code owner; `null` unless valid.
    pub user_id: Option<String>,
    /// `ENTER` or `EXIT`; `null` unless valid.
    pub event_type: Option<EventType>,
    /// Outcome detail.
    #[serde(default)]
    pub reason: Option<ResultReason>,
}

impl ValidationResponse {
    /// Serialize as a single line (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns an error only if serialization fails.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse the last non-empty line of a producer's stdout.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EmptyOutput`] if there is no such line, or
    /// [`ProtocolError::InvalidJson`] if it is not a result object.
    pub fn parse_last_line(stdout: &str) -> Result<Self, ProtocolError> {
        let line = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or(ProtocolError::EmptyOutput)?;
        Ok(serde_json::from_str(line)?)
    }

    /// Reason as a string, `unknown` if absent.
    #[must_use]
    pub fn reason_str(&self) -> &'static str {
        self.reason.map_or("unknown", ResultReason::as_str)
    }
}

impl From<&Redemption> for ValidationResponse {
    fn from(redemption: &Redemption) -> Self {
        let reason = match redemption {
            Redemption::Accepted { .. } => ResultReason::Accepted,
            Redemption::Rejected(r) => match r {
                RejectReason::EmptyInput => ResultReason::EmptyInput,
                RejectReason::NotFound => ResultReason::NotFound,
                RejectReason::Malformed => ResultReason::Malformed,
                RejectReason::Expired => ResultReason::Expired,
            },
            Redemption::StoreError(e) if e.is_outcome_unknown() => ResultReason::OutcomeUnknown,
            Redemption::StoreError(_) => ResultReason::StoreError,
            Redemption::DownstreamFailure { .. } => ResultReason::DownstreamFailure,
        };

        Self {
            is_valid: redemption.is_valid(),
            user_id: redemption.user_id().map(str::to_string),
            event_type: redemption.event_type(),
            reason: Some(reason),
        }
    }
}
