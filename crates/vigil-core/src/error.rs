//! Error taxonomy for Vigil core operations.

use vigil_ledger::StorageError;

/// Vigil domain errors.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("agent source enumeration failed: {0}")]
    Enumerator(String),

    #[error("duplicate agent name in source listing: {0}")]
    DuplicateAgent(String),

    #[error("invalid agent name: {0:?}")]
    InvalidAgent(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Vigil core operations.
pub type Result<T> = std::result::Result<T, VigilError>;

/// Reject empty or whitespace-padded agent names.
pub(crate) fn validate_agent(agent: &str) -> Result<()> {
    if agent.is_empty() || agent.trim() != agent {
        return Err(VigilError::InvalidAgent(agent.to_string()));
    }
    Ok(())
}
