//! In-memory fake for the ledger store (testing only)
//!
//! `MemoryLedgerStore` satisfies the `LedgerStore` contract without touching
//! disk, and can simulate the two failure modes the rest of Vigil must cope
//! with: corrupt documents and failed writes.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::store::{appended, DocUpdate, LedgerStore, StorageResult};

#[derive(Debug, Default)]
struct Inner {
    docs: HashMap<String, Value>,
    corrupt: HashSet<String>,
    failing: HashSet<String>,
}

/// In-memory ledger backed by a `HashMap<key, document>`.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<Inner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write to `key` fail, as if the process crashed
    /// before the write became visible.
    pub fn fail_writes_to(&self, key: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing.insert(key.to_string());
        }
    }

    /// Undo [`fail_writes_to`](Self::fail_writes_to).
    pub fn heal(&self, key: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing.remove(key);
        }
    }

    /// Mark `key` as holding bytes that do not parse. The next successful
    /// write clears the mark.
    pub fn corrupt(&self, key: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.docs.remove(key);
            inner.corrupt.insert(key.to_string());
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Backend("memory ledger mutex poisoned".to_string()))
    }
}

impl Inner {
    fn check_writable(&self, key: &str) -> StorageResult<()> {
        if self.failing.contains(key) {
            return Err(StorageError::InjectedFailure {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn current(&self, key: &str) -> Option<Value> {
        if self.corrupt.contains(key) {
            return None;
        }
        self.docs.get(key).cloned()
    }

    fn store(&mut self, key: &str, doc: Value) {
        self.corrupt.remove(key);
        self.docs.insert(key.to_string(), doc);
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let inner = self.lock()?;
        if inner.corrupt.contains(key) {
            return Err(StorageError::Corrupt {
                key: key.to_string(),
            });
        }
        Ok(inner.docs.get(key).cloned())
    }

    async fn put_atomic(&self, key: &str, doc: Value) -> StorageResult<()> {
        let mut inner = self.lock()?;
        inner.check_writable(key)?;
        inner.store(key, doc);
        Ok(())
    }

    async fn append_atomic(&self, key: &str, entry: Value) -> StorageResult<()> {
        let mut inner = self.lock()?;
        inner.check_writable(key)?;
        let next = appended(key, inner.current(key), entry);
        inner.store(key, next);
        Ok(())
    }

    async fn update_atomic(&self, key: &str, f: DocUpdate) -> StorageResult<Value> {
        let mut inner = self.lock()?;
        inner.check_writable(key)?;
        let next = f(inner.current(key))?;
        inner.store(key, next.clone());
        Ok(next)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut inner = self.lock()?;
        inner.check_writable(key)?;
        inner.docs.remove(key);
        inner.corrupt.remove(key);
        Ok(())
    }
}
