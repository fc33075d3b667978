//! Live roster of users currently inside the facility.
//!
//! One document per present user, keyed by user id. ENTER replaces the
//! document wholesale; EXIT deletes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::store::{Collection, StoreHandle, StoreResult, TxStep, Write};
use crate::types::EventType;

/// Presence status. Only `active` is ever stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// The user is inside.
    #[default]
    Active,
}

/// Workout categories, filled in later by other tools. Unset at entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct WorkoutTags {
    /// Cardio session.
    pub cardio: Option<bool>,
    /// Leg day.
    pub legs: Option<bool>,
    /// Arm training.
    pub arms: Option<bool>,
    /// Chest training.
    pub chest: Option<bool>,
}

/// A user currently present in the facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyRecord {
    /// Owner of the record; also the document key.
    pub user_id: String,
    /// Time of the most recent ENTER.
    pub entry_time: DateTime<Utc>,
    /// Always `active`.
    #[serde(default)]
    pub status: PresenceStatus,
    /// Session length in seconds, if something has recorded it.
    #[serde(default)]
    pub duration: Option<u64>,
    /// Free-form workout label, if something has recorded it.
    #[serde(default)]
    pub workout_type: Option<String>,
    /// Reset on every ENTER.
    #[serde(default)]
    pub workout_tags: WorkoutTags,
    /// Time of the most recent write.
    pub last_updated: DateTime<Utc>,
}

impl OccupancyRecord {
    /// A fresh record for a user entering at `now`.
    pub fn entering(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            entry_time: now,
            status: PresenceStatus::Active,
            duration: None,
            workout_type: None,
            workout_tags: WorkoutTags::default(),
            last_updated: now,
        }
    }
}

/// What an EXIT removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExitSummary {
    /// User who left.
    pub user_id: String,
    /// When the removed session started.
    pub entry_time: DateTime<Utc>,
    /// When the user left.
    pub exit_time: DateTime<Utc>,
    /// Whole seconds between entry and exit. Never negative.
    pub duration_secs: u64,
}

/// Effect of applying one event to the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OccupancyChange {
    /// The user's record was written.
    Entered(OccupancyRecord),
    /// The user's record was removed. `None` if there was no record.
    Exited(Option<ExitSummary>),
}

/// Maintains the set of currently-present users.
#[derive(Debug, Clone)]
pub struct OccupancyTracker {
    store: StoreHandle,
}

impl OccupancyTracker {
    /// Create a tracker over the shared store handle.
    #[must_use]
    pub const fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Apply an event for `user_id` at the current time.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::store::StoreError) on store failure.
    pub async fn apply(&self, user_id: &str, event_type: EventType) -> StoreResult<OccupancyChange> {
        self.apply_at(user_id, event_type, Utc::now()).await
    }

    /// Apply an event for `user_id` at `now`.
    ///
    /// ENTER overwrites any existing record (last writer wins). EXIT deletes
    /// the record if present and reports how long the session lasted; an
    /// EXIT with no record is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::store::StoreError) on store failure.
    pub async fn apply_at(
        &self,
        user_id: &str,
        event_type: EventType,
        now: DateTime<Utc>,
    ) -> StoreResult<OccupancyChange> {
        match event_type {
            EventType::Enter => {
                let record = OccupancyRecord::entering(user_id, now);
                self.store.set(Collection::Occupancy, user_id, &record).await?;
                info!(user_id, "user entered");
                Ok(OccupancyChange::Entered(record))
            }
            EventType::Exit => {
                let summary = self
                    .store
                    .transact(Collection::Occupancy, user_id, |doc| Ok(leave(user_id, doc, now)))
                    .await?;
                match &summary {
                    Some(s) => info!(user_id, duration_secs = s.duration_secs, "user exited"),
                    None => debug!(user_id, "exit without an occupancy record"),
                }
                Ok(OccupancyChange::Exited(summary))
            }
        }
    }

    /// Every user currently inside, ordered by user id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::store::StoreError) on store failure
    /// or if a record is corrupt.
    pub async fn list_active(&self) -> StoreResult<Vec<OccupancyRecord>> {
        Ok(self
            .store
            .list_as::<OccupancyRecord>(Collection::Occupancy)
            .await?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }
}

fn leave(user_id: &str, doc: Option<&Value>, now: DateTime<Utc>) -> TxStep<Option<ExitSummary>> {
    let Some(doc) = doc else {
        return TxStep::Skip(None);
    };

    // A record without a readable entry time is still removed.
    let summary = doc
        .get("entryTime")
        .and_then(|v| DateTime::<Utc>::deserialize(v).ok())
        .map(|entry_time| ExitSummary {
            user_id: user_id.to_string(),
            entry_time,
            exit_time: now,
            duration_secs: u64::try_from((now - entry_time).num_seconds()).unwrap_or(0),
        });

    TxStep::Commit {
        write: Write::Delete,
        output: summary,
    }
}
