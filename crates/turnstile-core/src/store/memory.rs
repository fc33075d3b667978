//! In-process document store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Collection, Commit, DocumentStore, StoreResult, Versioned, Write};

#[derive(Debug, Default)]
struct Inner {
    sequence: u64,
    docs: BTreeMap<(Collection, String), Versioned>,
}

impl Inner {
    fn next_version(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn put(&mut self, collection: Collection, key: &str, data: Value) -> u64 {
        let version = self.next_version();
        self.docs
            .insert((collection, key.to_string()), Versioned { version, data });
        version
    }
}

/// A [`DocumentStore`] held entirely in memory.
///
/// All operations are serialized by one mutex, so commits are trivially
/// linearizable. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    operations: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of backend calls served so far.
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Returns `true` if no documents are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().docs.is_empty()
    }

    /// Number of documents in `collection`.
    pub fn len(&self, collection: Collection) -> usize {
        self.inner
            .lock()
            .docs
            .keys()
            .filter(|(c, _)| *c == collection)
            .count()
    }

    /// Write a document synchronously, bypassing the async interface.
    ///
    /// Used for seeding and for simulating a competing writer.
    pub fn put_now(&self, collection: Collection, key: &str, data: Value) -> u64 {
        self.inner.lock().put(collection, key, data)
    }

    /// Delete a document synchronously, bypassing the async interface.
    pub fn remove_now(&self, collection: Collection, key: &str) -> bool {
        self.inner
            .lock()
            .docs
            .remove(&(collection, key.to_string()))
            .is_some()
    }

    fn touch(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Versioned>> {
        self.touch();
        Ok(self
            .inner
            .lock()
            .docs
            .get(&(collection, key.to_string()))
            .cloned())
    }

    async fn commit(
        &self,
        collection: Collection,
        key: &str,
        expected: Option<u64>,
        write: Write,
    ) -> StoreResult<Commit> {
        self.touch();
        let mut inner = self.inner.lock();
        let slot = (collection, key.to_string());
        let current = inner.docs.get(&slot).map(|doc| doc.version);

        if current != expected {
            return Ok(Commit::Conflict { current });
        }

        let version = match write {
            Write::Put(data) => Some(inner.put(collection, key, data)),
            Write::Delete => {
                inner.docs.remove(&slot);
                None
            }
        };
        Ok(Commit::Applied { version })
    }

    async fn set(&self, collection: Collection, key: &str, data: Value) -> StoreResult<u64> {
        self.touch();
        Ok(self.inner.lock().put(collection, key, data))
    }

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        self.touch();
        Ok(self
            .inner
            .lock()
            .docs
            .remove(&(collection, key.to_string()))
            .is_some())
    }

    async fn list(&self, collection: Collection) -> StoreResult<Vec<(String, Versioned)>> {
        self.touch();
        Ok(self
            .inner
            .lock()
            .docs
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|((_, key), doc)| (key.clone(), doc.clone()))
            .collect())
    }
}
