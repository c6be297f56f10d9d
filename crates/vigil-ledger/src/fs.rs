use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::store::{appended, DocUpdate, LedgerStore, StorageResult};

/// Filesystem-backed ledger: one pretty-printed JSON file per key.
///
/// Layout: `<root>/<key>.json`
///
/// Every write lands in a temp file in `<root>` and is renamed over the
/// target, so a crash mid-write leaves the previous document intact. Writers
/// are serialized on one in-process lock; readers take no lock.
pub struct FsLedgerStore {
    root: PathBuf,
    writer: Mutex<()>,
}

impl FsLedgerStore {
    /// Create a store rooted at `root`. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            writer: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document file for `key`.
    pub fn doc_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }

    async fn write_locked<F>(&self, key: &str, step: F) -> StorageResult<Value>
    where
        F: FnOnce(Option<Value>) -> StorageResult<Value> + Send + 'static,
    {
        let path = self.doc_path(key)?;
        let root = self.root.clone();
        let key = key.to_string();

        let _guard = self.writer.lock().await;
        blocking(move || {
            let current = match read_doc(&path, &key) {
                Ok(doc) => doc,
                Err(e) if e.is_corrupt() => {
                    warn!(key = %key, "overwriting corrupt ledger document");
                    None
                }
                Err(e) => return Err(e),
            };
            let next = step(current)?;
            write_doc(&root, &path, &next)?;
            debug!(key = %key, "ledger document written");
            Ok(next)
        })
        .await
    }
}

#[async_trait]
impl LedgerStore for FsLedgerStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let path = self.doc_path(key)?;
        let key = key.to_string();
        blocking(move || read_doc(&path, &key)).await
    }

    async fn put_atomic(&self, key: &str, doc: Value) -> StorageResult<()> {
        self.write_locked(key, move |_| Ok(doc)).await.map(|_| ())
    }

    async fn append_atomic(&self, key: &str, entry: Value) -> StorageResult<()> {
        let owned = key.to_string();
        self.write_locked(key, move |current| Ok(appended(&owned, current, entry)))
            .await
            .map(|_| ())
    }

    async fn update_atomic(&self, key: &str, f: DocUpdate) -> StorageResult<Value> {
        self.write_locked(key, f).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.doc_path(key)?;
        let _guard = self.writer.lock().await;
        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        })
        .await
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(StorageError::Backend(format!("invalid ledger key: {key:?}")));
    }
    Ok(())
}

fn read_doc(path: &Path, key: &str) -> StorageResult<Option<Value>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::Io(e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|_| StorageError::Corrupt {
            key: key.to_string(),
        })
}

fn write_doc(dir: &Path, path: &Path, doc: &Value) -> StorageResult<()> {
    let bytes = serde_json::to_vec_pretty(doc)?;

    // Atomic write: temp file in the same directory, fsync, then rename.
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

async fn blocking<T, F>(f: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Backend(format!("ledger worker failed: {e}")))?
}
