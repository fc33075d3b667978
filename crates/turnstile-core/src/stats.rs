//! Hourly entry/exit counters.
//!
//! One document per UTC hour, keyed `YYYY-MM-DD-HH`. Buckets are created on
//! the first event of the hour and only ever incremented afterwards.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use utoipa::ToSchema;

use crate::store::{decode, encode, Collection, StoreHandle, StoreResult, TxStep, Write};
use crate::types::{EventType, HourKey};

/// Counters for one UTC hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct HourlyStatsBucket {
    /// ENTER events in this hour.
    #[serde(default)]
    pub entries: u64,
    /// EXIT events in this hour.
    #[serde(default)]
    pub exits: u64,
    /// Timestamp of the most recent contributing event.
    #[serde(default, alias = "lastUpdated")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl HourlyStatsBucket {
    /// Count one event.
    pub fn record(&mut self, event_type: EventType, at: DateTime<Utc>) {
        match event_type {
            EventType::Enter => self.entries += 1,
            EventType::Exit => self.exits += 1,
        }
        self.last_updated = Some(at);
    }
}

/// Maintains the hourly statistics ledger.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    store: StoreHandle,
}

impl StatsAggregator {
    /// Create an aggregator over the shared store handle.
    #[must_use]
    pub const fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Atomically count one event in the bucket containing `event_time`.
    ///
    /// Concurrent calls for the same hour never lose updates: the increment
    /// is committed against the version it was computed from and retried
    /// on conflict.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::store::StoreError) if the store
    /// fails or the retry policy is exhausted.
    pub async fn record_event(
        &self,
        event_type: EventType,
        event_time: DateTime<Utc>,
    ) -> StoreResult<HourlyStatsBucket> {
        let key = HourKey::containing(event_time).to_string();

        let bucket = self
            .store
            .transact(Collection::HourlyStats, &key, |doc| {
                increment(&key, doc, event_type, event_time)
            })
            .await?;

        debug!(
            hour_key = %key,
            %event_type,
            entries = bucket.entries,
            exits = bucket.exits,
            "hourly stats updated"
        );
        Ok(bucket)
    }

    /// Fetch one bucket, if any event has been recorded in that hour.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::store::StoreError) on store failure
    /// or if the stored document is corrupt.
    pub async fn get_bucket(&self, hour: HourKey) -> StoreResult<Option<HourlyStatsBucket>> {
        self.store
            .get_as(Collection::HourlyStats, &hour.to_string())
            .await
    }

    /// All 24 buckets of a UTC calendar day. Hours without events are zero.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::store::StoreError) on store failure.
    pub async fn day(&self, date: NaiveDate) -> StoreResult<Vec<(HourKey, HourlyStatsBucket)>> {
        let mut buckets = Vec::with_capacity(24);
        for hour in HourKey::day(date) {
            let bucket = self.get_bucket(hour).await?.unwrap_or_default();
            buckets.push((hour, bucket));
        }
        Ok(buckets)
    }
}

fn increment(
    key: &str,
    doc: Option<&Value>,
    event_type: EventType,
    event_time: DateTime<Utc>,
) -> StoreResult<TxStep<HourlyStatsBucket>> {
    let mut bucket: HourlyStatsBucket = match doc {
        Some(data) => decode(Collection::HourlyStats, key, data.clone())?,
        None => HourlyStatsBucket::default(),
    };
    bucket.record(event_type, event_time);

    Ok(TxStep::Commit {
        write: Write::Put(encode(Collection::HourlyStats, key, &bucket)?),
        output: bucket,
    })
}
