//! Error types for vigil-ledger

use thiserror::Error;

/// Errors that can occur in the ledger persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem I/O failure (disk full, permission denied, ...)
    #[error("Ledger I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Database backend error
    #[error("Ledger backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Document exists but is not well-formed JSON
    #[error("Ledger document is corrupt: {key}")]
    Corrupt { key: String },

    /// Write refused by a fault-injecting fake
    #[error("Injected write failure for key: {key}")]
    InjectedFailure { key: String },
}

impl StorageError {
    /// Whether this error describes unreadable content rather than a failed
    /// storage operation. Corrupt documents are read as empty state.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StorageError::Corrupt { .. })
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_is_flagged() {
        let err = StorageError::Corrupt {
            key: "registry".to_string(),
        };
        assert!(err.is_corrupt());
        assert!(err.to_string().contains("registry"));
    }

    #[test]
    fn io_is_not_corrupt() {
        let err = StorageError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(!err.is_corrupt());
        assert!(err.to_string().contains("I/O"));
    }
}
