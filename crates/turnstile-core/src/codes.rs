//! Single-use access code redemption.
//!
//! A code document is resolved at most once. Lookup and deletion happen in
//! one optimistic transaction: the delete is committed against the version
//! that was read, so of several concurrent redeemers exactly one wins and
//! the rest re-read an absent document and see [`RejectReason::NotFound`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::store::{Collection, StoreHandle, StoreResult, TxStep, Write};
use crate::types::{EventType, Outcome, RejectReason};

/// Stored shape of an access code, as written by the issuer.
///
/// Every field is optional at the decoding layer so that incomplete
/// documents can be told apart from absent ones.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCodeDoc {
    /// Instant after which the code is no longer accepted.
    pub expiry_time: Option<DateTime<Utc>>,
    /// Owner of the code.
    pub user_id: Option<String>,
    /// `enter` or `exit`, any casing.
    #[serde(rename = "type")]
    pub code_type: Option<String>,
}

impl AccessCodeDoc {
    /// A complete code document.
    pub fn new(user_id: impl Into<String>, event_type: EventType, expiry_time: DateTime<Utc>) -> Self {
        Self {
            expiry_time: Some(expiry_time),
            user_id: Some(user_id.into()),
            code_type: Some(event_type.as_str().to_ascii_lowercase()),
        }
    }

    fn event_type(&self) -> Option<EventType> {
        self.code_type.as_deref().and_then(|t| t.parse().ok())
    }
}

/// Redacted form of a code for log output: first three characters plus length.
///
/// Codes are bearer credentials and are never logged in full.
#[must_use]
pub fn code_hint(code: &str) -> String {
    let prefix: String = code.chars().take(3).collect();
    format!("{prefix}…({})", code.chars().count())
}

/// Validates and consumes access codes.
#[derive(Debug, Clone)]
pub struct CodeRegistry {
    store: StoreHandle,
}

impl CodeRegistry {
    /// Create a registry over the shared store handle.
    #[must_use]
    pub const fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Resolve `code` against the current time, consuming it if it exists
    /// and is well-formed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::store::StoreError) if the store is
    /// unavailable, times out, or the transaction cannot commit. Rejections
    /// are reported through [`Outcome`], not as errors.
    pub async fn validate_and_consume(&self, code: &str) -> StoreResult<Outcome> {
        self.validate_and_consume_at(code, Utc::now()).await
    }

    /// Same as [`validate_and_consume`](Self::validate_and_consume), with
    /// an explicit notion of "now".
    ///
    /// # Errors
    ///
    /// See [`validate_and_consume`](Self::validate_and_consume).
    pub async fn validate_and_consume_at(&self, code: &str, now: DateTime<Utc>) -> StoreResult<Outcome> {
        if code.trim().is_empty() {
            debug!("empty access code");
            return Ok(Outcome::Rejected(RejectReason::EmptyInput));
        }

        let hint = code_hint(code);
        let outcome = self
            .store
            .transact(Collection::AccessCodes, code, |doc| Ok(resolve(doc, now)))
            .await?;

        match &outcome {
            Outcome::Accepted { user_id, event_type } => {
                info!(code = %hint, user_id, %event_type, "access code accepted and consumed");
            }
            Outcome::Rejected(RejectReason::Expired) => {
                info!(code = %hint, reason = "expired", "expired access code consumed");
            }
            Outcome::Rejected(RejectReason::Malformed) => {
                warn!(code = %hint, reason = "malformed", "access code document is incomplete; left in place");
            }
            Outcome::Rejected(reason) => {
                info!(code = %hint, %reason, "access code rejected");
            }
        }

        Ok(outcome)
    }
}

/// Decide the fate of a code document. Pure; runs inside the transaction.
fn resolve(doc: Option<&Value>, now: DateTime<Utc>) -> TxStep<Outcome> {
    let reject = |reason| TxStep::Skip(Outcome::Rejected(reason));
    let consume = |outcome| TxStep::Commit {
        write: Write::Delete,
        output: outcome,
    };

    let Some(doc) = doc else {
        return reject(RejectReason::NotFound);
    };
    let Ok(record) = AccessCodeDoc::deserialize(doc) else {
        return reject(RejectReason::Malformed);
    };
    let Some(expiry) = record.expiry_time else {
        return reject(RejectReason::Malformed);
    };

    if expiry < now {
        return consume(Outcome::Rejected(RejectReason::Expired));
    }

    match (record.user_id.clone(), record.event_type()) {
        (Some(user_id), Some(event_type)) => consume(Outcome::Accepted { user_id, event_type }),
        _ => reject(RejectReason::Malformed),
    }
}
