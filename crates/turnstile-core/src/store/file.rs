//! File-backed document store.
//!
//! Layout under the data directory:
//!
//! ```text
//! <data_dir>/
//! ├── .lock                      exclusive lock held during every write
//! ├── .sequence                  last issued document version
//! ├── gymAccessCodes/<key>.json
//! ├── gymHourlyStats/<key>.json
//! └── usersInGym/<key>.json
//! ```
//!
//! Each document file holds `{"key": "...", "version": n, "data": {...}}`.
//! File names are the escaped key, or `~` plus the SHA-256 of the key when
//! the escaped form would be too long for the filesystem. Writes replace
//! files by rename, so readers never observe a half-written document and
//! need no lock. Writers serialize on an OS-level lock (`flock` on Unix)
//! so that several short-lived processes can share one data directory.

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{Collection, Commit, DocumentStore, StoreError, StoreResult, Versioned, Write};

const LOCK_FILE: &str = ".lock";
const SEQUENCE_FILE: &str = ".sequence";

/// Longest escaped key used verbatim as a file stem. Leaves room for the
/// `.json` extension and the temp-file suffix within a 255-byte name.
const MAX_STEM_LEN: usize = 200;

/// Marks a hashed stem. Never produced by [`escape_key`].
const HASHED_PREFIX: char = '~';

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    /// Absent in files written before keys were recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    version: u64,
    data: Value,
}

#[derive(Debug)]
struct Inner {
    root: PathBuf,
    lock_file: File,
    // flock does not exclude threads sharing one open file description.
    local: Mutex<()>,
}

/// A [`DocumentStore`] persisting one JSON file per document.
#[derive(Debug, Clone)]
pub struct FileStore {
    inner: Arc<Inner>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory tree or lock file cannot be created.
    pub fn open(data_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = data_dir.into();
        for collection in Collection::ALL {
            fs::create_dir_all(root.join(collection.name()))?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(root.join(LOCK_FILE))?;

        debug!(root = %root.display(), "opened file store");
        Ok(Self {
            inner: Arc::new(Inner {
                root,
                lock_file,
                local: Mutex::new(()),
            }),
        })
    }

    /// Root directory of this store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&Inner) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store worker failed: {e}")))?
    }
}

impl Inner {
    fn doc_path(&self, collection: Collection, key: &str) -> PathBuf {
        self.root
            .join(collection.name())
            .join(format!("{}.json", file_stem(key)))
    }

    fn read(&self, collection: Collection, key: &str) -> StoreResult<Option<Versioned>> {
        Ok(read_envelope(&self.doc_path(collection, key), collection, key)?.map(|(_, doc)| doc))
    }

    /// Run `op` while holding both the in-process and the OS-level lock.
    fn locked<T>(&self, op: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
        let _local = self.local.lock();
        self.lock_file.lock_exclusive()?;
        let result = op();
        let unlocked = FileExt::unlock(&self.lock_file);
        let value = result?;
        unlocked?;
        Ok(value)
    }

    fn next_version(&self) -> StoreResult<u64> {
        let path = self.root.join(SEQUENCE_FILE);
        let last = match fs::read_to_string(&path) {
            Ok(text) => text
                .trim()
                .parse::<u64>()
                .map_err(|e| StoreError::Unavailable(format!("corrupt {SEQUENCE_FILE}: {e}")))?,
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let next = last + 1;
        replace_file(&path, next.to_string().as_bytes())?;
        Ok(next)
    }

    fn put(&self, collection: Collection, key: &str, data: Value) -> StoreResult<u64> {
        let version = self.next_version()?;
        let envelope = Envelope {
            key: Some(key.to_string()),
            version,
            data,
        };
        let body = serde_json::to_vec_pretty(&envelope).map_err(|e| {
            StoreError::Decode {
                collection,
                key: collection.display_key(key),
                message: e.to_string(),
            }
        })?;
        replace_file(&self.doc_path(collection, key), &body)?;
        Ok(version)
    }

    fn remove(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        match fs::remove_file(self.doc_path(collection, key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Versioned>> {
        let key = key.to_string();
        self.blocking(move |inner| inner.read(collection, &key)).await
    }

    async fn commit(
        &self,
        collection: Collection,
        key: &str,
        expected: Option<u64>,
        write: Write,
    ) -> StoreResult<Commit> {
        let key = key.to_string();
        self.blocking(move |inner| {
            inner.locked(|| {
                let current = inner.read(collection, &key)?.map(|doc| doc.version);
                if current != expected {
                    return Ok(Commit::Conflict { current });
                }
                let version = match write {
                    Write::Put(data) => Some(inner.put(collection, &key, data)?),
                    Write::Delete => {
                        inner.remove(collection, &key)?;
                        None
                    }
                };
                Ok(Commit::Applied { version })
            })
        })
        .await
    }

    async fn set(&self, collection: Collection, key: &str, data: Value) -> StoreResult<u64> {
        let key = key.to_string();
        self.blocking(move |inner| inner.locked(|| inner.put(collection, &key, data)))
            .await
    }

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        let key = key.to_string();
        self.blocking(move |inner| inner.locked(|| inner.remove(collection, &key)))
            .await
    }

    async fn list(&self, collection: Collection) -> StoreResult<Vec<(String, Versioned)>> {
        self.blocking(move |inner| {
            let dir = inner.root.join(collection.name());
            let mut docs = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                let Some(stem) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_suffix(".json"))
                else {
                    continue;
                };
                // Only used for error messages until the envelope names the key.
                let label = stem.to_string();
                let Some((stored, doc)) = read_envelope(&path, collection, &label)? else {
                    continue;
                };
                let key = match stored {
                    Some(key) => key,
                    None => match unescape_key(stem) {
                        Some(key) => key,
                        None => continue,
                    },
                };
                docs.push((key, doc));
            }
            docs.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(docs)
        })
        .await
    }
}

fn read_envelope(
    path: &Path,
    collection: Collection,
    key: &str,
) -> StoreResult<Option<(Option<String>, Versioned)>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let envelope: Envelope = serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode {
        collection,
        key: collection.display_key(key),
        message: e.to_string(),
    })?;
    Ok(Some((
        envelope.key,
        Versioned {
            version: envelope.version,
            data: envelope.data,
        },
    )))
}

fn replace_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".tmp-{}", std::process::id()));
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

/// Map an arbitrary key onto a safe file stem.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`. The mapping is injective, so distinct keys never share a file.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

/// File stem for `key`: the escaped key, or a fixed-length digest when that
/// would exceed [`MAX_STEM_LEN`].
fn file_stem(key: &str) -> String {
    let escaped = escape_key(key);
    if escaped.len() <= MAX_STEM_LEN {
        return escaped;
    }
    format!("{HASHED_PREFIX}{}", hex::encode(Sha256::digest(key.as_bytes())))
}

fn unescape_key(stem: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(stem.len());
    let mut chars = stem.bytes();
    while let Some(byte) = chars.next() {
        if byte == b'%' {
            let hi = char::from(chars.next()?).to_digit(16)?;
            let lo = char::from(chars.next()?).to_digit(16)?;
            bytes.push(u8::try_from(hi * 16 + lo).ok()?);
        } else {
            bytes.push(byte);
        }
    }
    String::from_utf8(bytes).ok()
}
