//! One redemption, end to end.
//!
//! The code is consumed first; only an accepted code fans out to the stats
//! ledger and then the occupancy roster. Consumption is not rolled back if a
//! follow-up step fails. Such partial failures are reported as
//! [`Redemption::DownstreamFailure`], distinct from rejections and outages.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::codes::{code_hint, CodeRegistry};
use crate::error::TurnstileError;
use crate::occupancy::{ExitSummary, OccupancyChange, OccupancyTracker};
use crate::stats::StatsAggregator;
use crate::store::StoreHandle;
use crate::types::{EventType, HourKey, Outcome, RejectReason};

/// Result of processing one code.
#[derive(Debug)]
pub enum Redemption {
    /// Code accepted, consumed, and all follow-ups recorded.
    Accepted {
        /// Owner of the code.
        user_id: String,
        /// Direction of the event.
        event_type: EventType,
        /// Bucket the event was counted in.
        hour_key: HourKey,
        /// Session that ended, for EXIT events with a prior ENTER.
        exit: Option<ExitSummary>,
    },
    /// Code not accepted. Nothing was recorded.
    Rejected(RejectReason),
    /// The store failed while reading or consuming the code. Nothing was
    /// recorded, except that a consume that timed out
    /// ([`TurnstileError::CommitOutcomeUnknown`]) may have removed the code.
    StoreError(TurnstileError),
    /// Code accepted and consumed, but a follow-up update failed.
    DownstreamFailure {
        /// Owner of the consumed code.
        user_id: String,
        /// Direction of the event.
        event_type: EventType,
        /// `stats` or `occupancy`.
        stage: &'static str,
        /// Underlying failure.
        message: String,
    },
}

impl Redemption {
    /// Whether the code itself was valid (and is now consumed).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Accepted { .. } | Self::DownstreamFailure { .. })
    }

    /// Machine-readable outcome, as carried in the JSON `reason` field.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Rejected(reason) => reason.as_str(),
            Self::StoreError(TurnstileError::CommitOutcomeUnknown { .. }) => "outcome_unknown",
            Self::StoreError(_) => "store_error",
            Self::DownstreamFailure { .. } => "downstream_failure",
        }
    }

    /// Owner of the code, when it was valid.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Accepted { user_id, .. } | Self::DownstreamFailure { user_id, .. } => Some(user_id),
            _ => None,
        }
    }

    /// Direction of the event, when the code was valid.
    #[must_use]
    pub const fn event_type(&self) -> Option<EventType> {
        match self {
            Self::Accepted { event_type, .. } | Self::DownstreamFailure { event_type, .. } => {
                Some(*event_type)
            }
            _ => None,
        }
    }

    /// The failure behind this redemption, if it was not a clean outcome.
    #[must_use]
    pub fn into_error(self) -> Option<TurnstileError> {
        match self {
            Self::StoreError(e) => Some(e),
            Self::DownstreamFailure {
                user_id,
                event_type,
                stage,
                message,
            } => Some(TurnstileError::DownstreamFailure {
                user_id,
                event_type,
                stage,
                message,
            }),
            Self::Accepted { .. } | Self::Rejected(_) => None,
        }
    }
}

/// Sequences code consumption, stats and occupancy for each redemption.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    store: StoreHandle,
    codes: CodeRegistry,
    stats: StatsAggregator,
    occupancy: OccupancyTracker,
}

impl Orchestrator {
    /// Build all components over one shared store handle.
    #[must_use]
    pub fn new(store: StoreHandle) -> Self {
        Self {
            codes: CodeRegistry::new(store.clone()),
            stats: StatsAggregator::new(store.clone()),
            occupancy: OccupancyTracker::new(store.clone()),
            store,
        }
    }

    /// The shared store handle.
    #[must_use]
    pub const fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Stats component, for read APIs.
    #[must_use]
    pub const fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    /// Occupancy component, for read APIs.
    #[must_use]
    pub const fn occupancy(&self) -> &OccupancyTracker {
        &self.occupancy
    }

    /// Process one scanned code at the current time.
    pub async fn process_code(&self, code: &str) -> Redemption {
        self.process_code_at(code, Utc::now()).await
    }

    /// Process one scanned code, using `now` for expiry and as the event time.
    pub async fn process_code_at(&self, code: &str, now: DateTime<Utc>) -> Redemption {
        let (user_id, event_type) = match self.codes.validate_and_consume_at(code, now).await {
            Ok(Outcome::Accepted { user_id, event_type }) => (user_id, event_type),
            Ok(Outcome::Rejected(reason)) => return Redemption::Rejected(reason),
            Err(e) => {
                let err = TurnstileError::from(e);
                warn!(code = %code_hint(code), error = %err, "code lookup failed");
                return Redemption::StoreError(err);
            }
        };

        let hour_key = HourKey::containing(now);
        if let Err(e) = self.stats.record_event(event_type, now).await {
            return downstream(user_id, event_type, "stats", &TurnstileError::from(e));
        }

        let exit = match self.occupancy.apply_at(&user_id, event_type, now).await {
            Ok(OccupancyChange::Exited(summary)) => summary,
            Ok(OccupancyChange::Entered(_)) => None,
            Err(e) => return downstream(user_id, event_type, "occupancy", &TurnstileError::from(e)),
        };

        info!(user_id, %event_type, %hour_key, "redemption complete");
        Redemption::Accepted {
            user_id,
            event_type,
            hour_key,
            exit,
        }
    }
}

fn downstream(user_id: String, event_type: EventType, stage: &'static str, err: &TurnstileError) -> Redemption {
    error!(
        user_id,
        %event_type,
        stage,
        error = %err,
        "code consumed but follow-up update failed; effects not recorded"
    );
    Redemption::DownstreamFailure {
        user_id,
        event_type,
        stage,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::Value;

    use super::*;
    use crate::codes::AccessCodeDoc;
    use crate::occupancy::OccupancyRecord;
    use crate::retry::RetryPolicy;
    use crate::store::{
        Collection, Commit, DocumentStore, MemoryStore, StoreError, StoreResult, Versioned, Write,
        DEFAULT_TIMEOUT,
    };

    /// Wraps a [`MemoryStore`] and fails every call on one collection.
    struct Faulty {
        inner: MemoryStore,
        broken: Collection,
        armed: AtomicBool,
    }

    impl Faulty {
        fn check(&self, collection: Collection) -> StoreResult<()> {
            if self.armed.load(Ordering::SeqCst) && collection == self.broken {
                Err(StoreError::Unavailable("injected failure".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl DocumentStore for Faulty {
        fn backend(&self) -> &'static str {
            "faulty"
        }

        async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Versioned>> {
            self.check(collection)?;
            self.inner.get(collection, key).await
        }

        async fn commit(
            &self,
            collection: Collection,
            key: &str,
            expected: Option<u64>,
            write: Write,
        ) -> StoreResult<Commit> {
            self.check(collection)?;
            self.inner.commit(collection, key, expected, write).await
        }

        async fn set(&self, collection: Collection, key: &str, data: Value) -> StoreResult<u64> {
            self.check(collection)?;
            self.inner.set(collection, key, data).await
        }

        async fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool> {
            self.check(collection)?;
            self.inner.delete(collection, key).await
        }

        async fn list(&self, collection: Collection) -> StoreResult<Vec<(String, Versioned)>> {
            self.check(collection)?;
            self.inner.list(collection).await
        }
    }

    fn faulty(broken: Collection) -> (Arc<Faulty>, Orchestrator) {
        let store = Arc::new(Faulty {
            inner: MemoryStore::new(),
            broken,
            armed: AtomicBool::new(true),
        });
        let handle = StoreHandle::new(store.clone(), DEFAULT_TIMEOUT, RetryPolicy::no_retry());
        (store, Orchestrator::new(handle))
    }

    async fn issue(store: &StoreHandle, code: &str, doc: &AccessCodeDoc) {
        store.set(Collection::AccessCodes, code, doc).await.unwrap();
    }

    #[tokio::test]
    async fn test_valid_enter_updates_stats_and_occupancy() {
        let orchestrator = Orchestrator::new(StoreHandle::in_memory());
        let now = Utc::now();
        issue(
            orchestrator.store(),
            "ABC123",
            &AccessCodeDoc::new("u1", EventType::Enter, now + Duration::minutes(5)),
        )
        .await;

        let redemption = orchestrator.process_code_at("ABC123", now).await;
        assert!(redemption.is_valid());
        assert_eq!(redemption.reason(), "accepted");

        let bucket = orchestrator
            .stats()
            .get_bucket(HourKey::containing(now))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bucket.entries, 1);

        let record: OccupancyRecord = orchestrator
            .store()
            .get_as(Collection::Occupancy, "u1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, crate::occupancy::PresenceStatus::Active);
    }

    #[tokio::test]
    async fn test_expired_code_records_nothing() {
        let orchestrator = Orchestrator::new(StoreHandle::in_memory());
        let now = Utc::now();
        issue(
            orchestrator.store(),
            "OLD999",
            &AccessCodeDoc::new("u1", EventType::Enter, now - Duration::hours(1)),
        )
        .await;

        let redemption = orchestrator.process_code_at("OLD999", now).await;
        assert!(!redemption.is_valid());
        assert_eq!(redemption.reason(), "expired");

        let store = orchestrator.store();
        assert!(store.get(Collection::AccessCodes, "OLD999").await.unwrap().is_none());
        assert!(store.get(Collection::HourlyStats, &HourKey::containing(now).to_string()).await.unwrap().is_none());
        assert!(orchestrator.occupancy().list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_code_makes_no_store_calls() {
        let memory = Arc::new(MemoryStore::new());
        let handle = StoreHandle::new(memory.clone(), DEFAULT_TIMEOUT, RetryPolicy::default());
        let orchestrator = Orchestrator::new(handle);

        let redemption = orchestrator.process_code("").await;
        assert!(!redemption.is_valid());
        assert_eq!(redemption.reason(), "empty_input");
        assert_eq!(memory.operation_count(), 0);
    }

    #[tokio::test]
    async fn test_exit_reports_session() {
        let orchestrator = Orchestrator::new(StoreHandle::in_memory());
        let t0 = Utc::now();
        let store = orchestrator.store();
        issue(store, "IN", &AccessCodeDoc::new("u1", EventType::Enter, t0 + Duration::hours(1))).await;
        issue(store, "OUT", &AccessCodeDoc::new("u1", EventType::Exit, t0 + Duration::hours(3))).await;

        orchestrator.process_code_at("IN", t0).await;
        let redemption = orchestrator.process_code_at("OUT", t0 + Duration::minutes(45)).await;

        let Redemption::Accepted { exit: Some(summary), .. } = redemption else {
            panic!("expected an accepted exit, got {redemption:?}");
        };
        assert_eq!(summary.duration_secs, 45 * 60);
        assert!(orchestrator.occupancy().list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_is_store_error() {
        let (_, orchestrator) = faulty(Collection::AccessCodes);

        let redemption = orchestrator.process_code("ABC123").await;
        assert!(!redemption.is_valid());
        assert_eq!(redemption.reason(), "store_error");
        assert!(redemption.into_error().is_some_and(|e| e.is_store_error()));
    }

    #[tokio::test]
    async fn test_stats_failure_is_downstream_and_code_stays_consumed() {
        let (faulty, orchestrator) = faulty(Collection::HourlyStats);
        let now = Utc::now();
        issue(
            orchestrator.store(),
            "ABC123",
            &AccessCodeDoc::new("u1", EventType::Enter, now + Duration::minutes(5)),
        )
        .await;

        let redemption = orchestrator.process_code_at("ABC123", now).await;
        assert!(redemption.is_valid());
        assert_eq!(redemption.reason(), "downstream_failure");
        assert_eq!(redemption.user_id(), Some("u1"));
        assert!(matches!(
            redemption,
            Redemption::DownstreamFailure { stage: "stats", .. }
        ));

        faulty.armed.store(false, Ordering::SeqCst);
        let again = orchestrator.process_code_at("ABC123", now).await;
        assert_eq!(again.reason(), "not_found");
    }

    #[tokio::test]
    async fn test_occupancy_failure_is_downstream() {
        let (_, orchestrator) = faulty(Collection::Occupancy);
        let now = Utc::now();
        issue(
            orchestrator.store(),
            "ABC123",
            &AccessCodeDoc::new("u1", EventType::Enter, now + Duration::minutes(5)),
        )
        .await;

        let redemption = orchestrator.process_code_at("ABC123", now).await;
        assert!(matches!(
            redemption,
            Redemption::DownstreamFailure { stage: "occupancy", .. }
        ));
        assert!(redemption.into_error().is_some());
    }

    /// A store that never answers reads.
    struct Stalled;

    #[async_trait]
    impl DocumentStore for Stalled {
        fn backend(&self) -> &'static str {
            "stalled"
        }

        async fn get(&self, _: Collection, _: &str) -> StoreResult<Option<Versioned>> {
            std::future::pending().await
        }

        async fn commit(&self, _: Collection, _: &str, _: Option<u64>, _: Write) -> StoreResult<Commit> {
            std::future::pending().await
        }

        async fn set(&self, _: Collection, _: &str, _: Value) -> StoreResult<u64> {
            std::future::pending().await
        }

        async fn delete(&self, _: Collection, _: &str) -> StoreResult<bool> {
            std::future::pending().await
        }

        async fn list(&self, _: Collection) -> StoreResult<Vec<(String, Versioned)>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_lookup_is_store_error_not_rejection() {
        let handle = StoreHandle::new(
            Arc::new(Stalled),
            std::time::Duration::from_millis(50),
            RetryPolicy::no_retry(),
        );
        let orchestrator = Orchestrator::new(handle);

        let redemption = orchestrator.process_code("ABC123").await;
        assert!(!redemption.is_valid());
        assert_eq!(redemption.reason(), "store_error");
        assert!(matches!(
            redemption.into_error(),
            Some(TurnstileError::StoreTimeout { timeout_ms: 50 })
        ));
    }
}
