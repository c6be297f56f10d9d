//! SurrealDB-backed LedgerStore implementation
//!
//! Documents live in the `ledger` table, one record per key
//! (`ledger:<key>`), with the JSON document in the `doc` field. Every write is
//! a single `UPSERT` statement; read-modify-write cycles are serialized by an
//! in-process writer lock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::store::{appended, DocUpdate, LedgerStore, StorageResult};

const NAMESPACE: &str = "vigil";
const DATABASE: &str = "ledger";

#[derive(Debug, Serialize, Deserialize)]
struct DocRow {
    doc: Value,
}

/// SurrealDB-backed implementation of [`LedgerStore`].
pub struct SurrealLedgerStore {
    db: Surreal<Any>,
    writer: Mutex<()>,
}

impl SurrealLedgerStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `vigil/ledger`, and defines the table.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect("mem://").await
    }

    /// Connect to any SurrealDB endpoint (`mem://`, `surrealkv://path`, `ws://host`).
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns(NAMESPACE).use_db(DATABASE).await?;
        init_schema(&db).await?;

        info!(url = %url, "SurrealLedgerStore connected");
        Ok(Self {
            db,
            writer: Mutex::new(()),
        })
    }

    async fn read(&self, key: &str) -> StorageResult<Option<Value>> {
        let mut res = self
            .db
            .query("SELECT doc FROM type::thing('ledger', $key)")
            .bind(("key", key.to_string()))
            .await?
            .check()?;

        let rows: Vec<DocRow> = res.take(0).map_err(|_| StorageError::Corrupt {
            key: key.to_string(),
        })?;
        Ok(rows.into_iter().next().map(|row| row.doc))
    }

    async fn write(&self, key: &str, doc: Value) -> StorageResult<()> {
        self.db
            .query("UPSERT type::thing('ledger', $key) SET doc = $doc")
            .bind(("key", key.to_string()))
            .bind(("doc", doc))
            .await?
            .check()?;
        debug!(key = %key, "ledger document upserted");
        Ok(())
    }

    async fn read_lenient(&self, key: &str) -> StorageResult<Option<Value>> {
        match self.read(key).await {
            Err(e) if e.is_corrupt() => Ok(None),
            other => other,
        }
    }
}

#[async_trait]
impl LedgerStore for SurrealLedgerStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        self.read(key).await
    }

    async fn put_atomic(&self, key: &str, doc: Value) -> StorageResult<()> {
        let _guard = self.writer.lock().await;
        self.write(key, doc).await
    }

    async fn append_atomic(&self, key: &str, entry: Value) -> StorageResult<()> {
        let _guard = self.writer.lock().await;
        let current = self.read_lenient(key).await?;
        self.write(key, appended(key, current, entry)).await
    }

    async fn update_atomic(&self, key: &str, f: DocUpdate) -> StorageResult<Value> {
        let _guard = self.writer.lock().await;
        let current = self.read_lenient(key).await?;
        let next = f(current)?;
        self.write(key, next.clone()).await?;
        Ok(next)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let _guard = self.writer.lock().await;
        self.db
            .query("DELETE type::thing('ledger', $key)")
            .bind(("key", key.to_string()))
            .await?
            .check()?;
        Ok(())
    }
}

/// Define the `ledger` table. Safe to call multiple times.
async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    db.query("DEFINE TABLE IF NOT EXISTS ledger SCHEMALESS;")
        .await?
        .check()?;
    debug!("ledger table ready");
    Ok(())
}
