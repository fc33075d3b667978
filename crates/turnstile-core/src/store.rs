//! Document store abstraction.
//!
//! The store is a set of named collections of JSON documents keyed by
//! string. Every document carries a version drawn from a store-wide,
//! strictly increasing sequence, which is what optimistic transactions
//! compare against at commit time.
//!
//! Two backends are provided:
//!
//! - [`MemoryStore`] - process-local, for tests and dry runs
//! - [`FileStore`] - JSON files under a data directory, safe across processes
//!
//! Components never talk to a backend directly. They receive a cloned
//! [`StoreHandle`], which bounds every call with a timeout and runs
//! read-modify-write transactions with conflict retry.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::retry::RetryPolicy;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Default bound on a single store call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised by the store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not serve the call.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A read did not finish in time.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// A write did not acknowledge in time. The backend may still have
    /// applied it, so the document's state is unknown until read again.
    #[error("write to {collection}/{key} unacknowledged after {after:?}; it may have been applied")]
    CommitOutcomeUnknown {
        /// Target collection.
        collection: Collection,
        /// Target document key, as [`Collection::display_key`] shows it.
        key: String,
        /// Timeout that elapsed.
        after: Duration,
    },

    /// A transaction lost every race it was allowed to retry.
    #[error("transaction on {collection}/{key} gave up after {attempts} attempts")]
    RetriesExhausted {
        /// Target collection.
        collection: Collection,
        /// Target document key, as [`Collection::display_key`] shows it.
        key: String,
        /// Attempts made, including the first.
        attempts: usize,
    },

    /// A stored document did not match the expected shape.
    #[error("cannot decode {collection}/{key}: {message}")]
    Decode {
        /// Source collection.
        collection: Collection,
        /// Source document key, as [`Collection::display_key`] shows it.
        key: String,
        /// Decoder message.
        message: String,
    },

    /// Filesystem failure in a file-backed store.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The collections the core reads and writes.
///
/// Names match the deployed database so existing documents map 1:1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Single-use access codes, keyed by code string.
    AccessCodes,
    /// Hourly entry/exit counters, keyed by `YYYY-MM-DD-HH`.
    HourlyStats,
    /// Currently-present users, keyed by user id.
    Occupancy,
}

impl Collection {
    /// Every collection, in a stable order.
    pub const ALL: [Self; 3] = [Self::AccessCodes, Self::HourlyStats, Self::Occupancy];

    /// Collection name in the backing store.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AccessCodes => "gymAccessCodes",
            Self::HourlyStats => "gymHourlyStats",
            Self::Occupancy => "usersInGym",
        }
    }

    /// `key` as it may appear in logs and error messages.
    ///
    /// Access code keys are the codes themselves and are reduced to a hint.
    #[must_use]
    pub fn display_key(self, key: &str) -> String {
        match self {
            Self::AccessCodes => crate::codes::code_hint(key),
            Self::HourlyStats | Self::Occupancy => key.to_string(),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A document together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    /// Store-wide sequence number of the last write to this document.
    pub version: u64,
    /// Document body.
    pub data: Value,
}

/// The write half of a conditional commit.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create or fully replace the document.
    Put(Value),
    /// Remove the document.
    Delete,
}

/// Result of a conditional commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// The write was applied. `version` is `None` after a delete.
    Applied {
        /// Version of the document after the write.
        version: Option<u64>,
    },
    /// The document changed since it was read; nothing was written.
    Conflict {
        /// Version currently stored (`None` if absent).
        current: Option<u64>,
    },
}

/// A document database backend.
///
/// Implementations must be `Send + Sync`; a single instance is shared by
/// every component of a process.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    /// Fetch a document.
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Versioned>>;

    /// Apply `write` only if the document is still at `expected`
    /// (`None` meaning "must not exist").
    async fn commit(
        &self,
        collection: Collection,
        key: &str,
        expected: Option<u64>,
        write: Write,
    ) -> StoreResult<Commit>;

    /// Unconditionally create or replace a document. Returns the new version.
    async fn set(&self, collection: Collection, key: &str, data: Value) -> StoreResult<u64>;

    /// Delete a document if it exists. Returns whether it existed.
    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool>;

    /// All documents of a collection, ordered by key.
    async fn list(&self, collection: Collection) -> StoreResult<Vec<(String, Versioned)>>;
}

/// What a transaction body decided after looking at the current document.
#[derive(Debug)]
pub enum TxStep<T> {
    /// Commit `write` and return `output` once it applies.
    Commit {
        /// Write to apply against the version that was read.
        write: Write,
        /// Value returned to the caller on success.
        output: T,
    },
    /// Return `output` without writing anything.
    Skip(T),
}

/// Process-wide handle to the configured store.
///
/// Cheap to clone. Built once at startup and passed into every component.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn DocumentStore>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("backend", &self.inner.backend())
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl StoreHandle {
    /// Wrap a backend with a call timeout and a transaction retry policy.
    pub fn new(store: Arc<dyn DocumentStore>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            inner: store,
            timeout,
            retry,
        }
    }

    /// A handle over a fresh [`MemoryStore`] with default settings.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), DEFAULT_TIMEOUT, RetryPolicy::default())
    }

    /// Name of the underlying backend.
    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    /// Per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(&self, call: impl Future<Output = StoreResult<T>> + Send) -> StoreResult<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    /// Like [`bounded`](Self::bounded), for calls that write.
    ///
    /// Dropping the future does not cancel a backend write already in
    /// flight, so an elapsed write is reported as
    /// [`StoreError::CommitOutcomeUnknown`] rather than a plain timeout.
    async fn bounded_write<T>(
        &self,
        collection: Collection,
        key: &str,
        call: impl Future<Output = StoreResult<T>> + Send,
    ) -> StoreResult<T> {
        tokio::time::timeout(self.timeout, call).await.map_err(|_| {
            warn!(
                %collection,
                key = %collection.display_key(key),
                after = ?self.timeout,
                "write unacknowledged; outcome unknown"
            );
            StoreError::CommitOutcomeUnknown {
                collection,
                key: collection.display_key(key),
                after: self.timeout,
            }
        })?
    }

    /// Fetch a document.
    pub async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Versioned>> {
        self.bounded(self.inner.get(collection, key)).await
    }

    /// Fetch and decode a document.
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        collection: Collection,
        key: &str,
    ) -> StoreResult<Option<T>> {
        self.get(collection, key)
            .await?
            .map(|doc| decode(collection, key, doc.data))
            .transpose()
    }

    /// Create or replace a document.
    pub async fn set<T: Serialize + Sync>(
        &self,
        collection: Collection,
        key: &str,
        record: &T,
    ) -> StoreResult<u64> {
        let data = encode(collection, key, record)?;
        self.bounded_write(collection, key, self.inner.set(collection, key, data))
            .await
    }

    /// Delete a document if present.
    pub async fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        self.bounded_write(collection, key, self.inner.delete(collection, key))
            .await
    }

    /// Decode every document of a collection.
    pub async fn list_as<T: DeserializeOwned>(
        &self,
        collection: Collection,
    ) -> StoreResult<Vec<(String, T)>> {
        self.bounded(self.inner.list(collection))
            .await?
            .into_iter()
            .map(|(key, doc)| decode(collection, &key, doc.data).map(|record| (key, record)))
            .collect()
    }

    /// Run an optimistic read-modify-write transaction on one document.
    ///
    /// `body` sees the current document (or `None`) and decides what to
    /// write. The write is committed against the version that was read; if
    /// another writer got there first the whole read-decide-commit cycle is
    /// repeated after a backoff delay. `body` must therefore be free of side
    /// effects.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RetriesExhausted`] once the retry policy is
    /// used up, [`StoreError::CommitOutcomeUnknown`] if the commit itself
    /// times out, or any error raised by `body` or the backend.
    pub async fn transact<T, F>(&self, collection: Collection, key: &str, mut body: F) -> StoreResult<T>
    where
        F: FnMut(Option<&Value>) -> StoreResult<TxStep<T>> + Send,
        T: Send,
    {
        let attempts = self.retry.max_attempts();

        for attempt in 0..attempts {
            let current = self.get(collection, key).await?;
            let expected = current.as_ref().map(|doc| doc.version);

            let (write, output) = match body(current.as_ref().map(|doc| &doc.data))? {
                TxStep::Skip(output) => return Ok(output),
                TxStep::Commit { write, output } => (write, output),
            };

            match self
                .bounded_write(collection, key, self.inner.commit(collection, key, expected, write))
                .await?
            {
                Commit::Applied { version } => {
                    if attempt > 0 {
                        debug!(
                            %collection,
                            key = %collection.display_key(key),
                            attempt,
                            ?version,
                            "transaction committed after retry"
                        );
                    }
                    return Ok(output);
                }
                Commit::Conflict { current } => {
                    debug!(
                        %collection,
                        key = %collection.display_key(key),
                        attempt,
                        ?expected,
                        ?current,
                        "transaction conflict"
                    );
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.retry.jittered_delay(attempt)).await;
                    }
                }
            }
        }

        warn!(
            %collection,
            key = %collection.display_key(key),
            attempts,
            "transaction retries exhausted"
        );
        Err(StoreError::RetriesExhausted {
            collection,
            key: collection.display_key(key),
            attempts,
        })
    }
}

/// Decode a stored document into a typed record.
///
/// # Errors
///
/// Returns [`StoreError::Decode`] if the document does not match `T`.
pub fn decode<T: DeserializeOwned>(collection: Collection, key: &str, data: Value) -> StoreResult<T> {
    serde_json::from_value(data).map_err(|e| StoreError::Decode {
        collection,
        key: collection.display_key(key),
        message: e.to_string(),
    })
}

/// Encode a typed record as a stored document.
///
/// # Errors
///
/// Returns [`StoreError::Decode`] if `record` cannot be represented as JSON.
pub fn encode<T: Serialize>(collection: Collection, key: &str, record: &T) -> StoreResult<Value> {
    serde_json::to_value(record).map_err(|e| StoreError::Decode {
        collection,
        key: collection.display_key(key),
        message: e.to_string(),
    })
}
