//! Ledger Store trait definitions
//!
//! The ledger is a key -> JSON document store with three write primitives:
//! - `put_atomic`: whole-value replace
//! - `append_atomic`: append one entry to an array document
//! - `update_atomic`: read-modify-write under the store's writer lock
//!
//! Readers never observe a partially written document. Every component of
//! Vigil goes through this trait; none of them touch files or tables directly.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Read-modify-write step passed to [`LedgerStore::update_atomic`].
///
/// Receives the current document (`None` when missing or corrupt) and returns
/// its replacement.
pub type DocUpdate = Box<dyn FnOnce(Option<Value>) -> StorageResult<Value> + Send>;

// ---------------------------------------------------------------------------
// Document keys
// ---------------------------------------------------------------------------

/// Stable document keys. External tooling reads these names directly.
pub mod keys {
    /// `{ "<agent>": EchoRecord }`
    pub const ECHO_PULSES: &str = "echo_pulses";
    /// `[IntentRecord]`
    pub const INTENT_TRAIL: &str = "intent_trail";
    /// `Registry`
    pub const REGISTRY: &str = "registry";
    /// Operator-requested copy of the previous `Registry`
    pub const REGISTRY_SNAPSHOT: &str = "registry_snapshot";
    /// `AuditRun`
    pub const AUDIT_RESULTS: &str = "audit_results";
    /// Latest `CertificationSnapshot`
    pub const CERTIFICATION_CURRENT: &str = "certification_current";
    /// The snapshot before `certification_current`
    pub const CERTIFICATION_PREVIOUS: &str = "certification_previous";
    /// `DriftReport`
    pub const DRIFT_REPORT: &str = "drift_report";
    /// Last `SentinelIncident`
    pub const SENTINEL_INCIDENT: &str = "sentinel_incident";
    /// `[SentinelIncident]`, only when callers choose to append
    pub const SENTINEL_INCIDENTS: &str = "sentinel_incidents";

    /// Every key, in a stable order.
    pub const ALL: &[&str] = &[
        ECHO_PULSES,
        INTENT_TRAIL,
        REGISTRY,
        REGISTRY_SNAPSHOT,
        AUDIT_RESULTS,
        CERTIFICATION_CURRENT,
        CERTIFICATION_PREVIOUS,
        DRIFT_REPORT,
        SENTINEL_INCIDENT,
        SENTINEL_INCIDENTS,
    ];
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

/// Key -> JSON document storage.
///
/// Guarantees:
/// - `get` after a successful write in the same process returns that write.
/// - `put_atomic` / `append_atomic` / `update_atomic` are all-or-nothing: a
///   failed write leaves the previous document readable and unchanged.
/// - `update_atomic` calls on the same store are serialized, so concurrent
///   read-modify-write cycles never lose updates.
/// - `get` distinguishes a missing document (`Ok(None)`) from a corrupt one
///   (`Err(StorageError::Corrupt)`).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read a document.
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Replace a document as a whole.
    async fn put_atomic(&self, key: &str, doc: Value) -> StorageResult<()>;

    /// Append `entry` to the array stored at `key`.
    ///
    /// A missing document starts a new array. A document that is not an array
    /// (or is corrupt) is discarded and replaced by `[entry]`.
    async fn append_atomic(&self, key: &str, entry: Value) -> StorageResult<()>;

    /// Read-modify-write under the writer lock, returning the stored value.
    async fn update_atomic(&self, key: &str, f: DocUpdate) -> StorageResult<Value>;

    /// Remove a document. No-op if absent.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Read a typed document, treating missing or corrupt content as empty state.
///
/// Only storage failures propagate; a document that is absent, not valid JSON,
/// or does not match `T` yields `T::default()`.
pub async fn read_or_default<T, S>(store: &S, key: &str) -> StorageResult<T>
where
    T: DeserializeOwned + Default,
    S: LedgerStore + ?Sized,
{
    match store.get(key).await {
        Ok(doc) => Ok(decode_or_default(key, doc)),
        Err(e) if e.is_corrupt() => {
            warn!(key = %key, "ledger document is corrupt, reading as empty");
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}

/// Decode an optional document into `T`, defaulting on absence or shape mismatch.
pub fn decode_or_default<T>(key: &str, doc: Option<Value>) -> T
where
    T: DeserializeOwned + Default,
{
    match doc {
        None => T::default(),
        Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "ledger document has unexpected shape, reading as empty");
            T::default()
        }),
    }
}

/// Serialize `value` and replace the document at `key`.
pub async fn put_typed<T, S>(store: &S, key: &str, value: &T) -> StorageResult<()>
where
    T: Serialize + ?Sized,
    S: LedgerStore + ?Sized,
{
    let doc = serde_json::to_value(value)?;
    store.put_atomic(key, doc).await
}

/// Serialize `entry` and append it to the array document at `key`.
pub async fn append_typed<T, S>(store: &S, key: &str, entry: &T) -> StorageResult<()>
where
    T: Serialize + ?Sized,
    S: LedgerStore + ?Sized,
{
    let doc = serde_json::to_value(entry)?;
    store.append_atomic(key, doc).await
}

/// Shared append semantics for backends: push onto an existing array or start
/// a new one, discarding any non-array value.
pub(crate) fn appended(key: &str, current: Option<Value>, entry: Value) -> Value {
    match current {
        Some(Value::Array(mut items)) => {
            items.push(entry);
            Value::Array(items)
        }
        Some(other) => {
            warn!(key = %key, kind = %json_kind(&other), "append target is not an array, starting fresh");
            Value::Array(vec![entry])
        }
        None => Value::Array(vec![entry]),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
