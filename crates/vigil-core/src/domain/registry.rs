//! The canonical set of known agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version written into every hydrated registry.
pub const REGISTRY_SCHEMA_VERSION: u32 = 1;

/// One agent source reported by an enumerator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSource {
    pub name: String,
    /// Opaque reference handed to the process runner (usually a path).
    pub source_ref: String,
}

impl AgentSource {
    pub fn new(name: impl Into<String>, source_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_ref: source_ref.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    Hydrated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryEntry {
    pub name: String,
    pub source_ref: String,
    pub registered_at: DateTime<Utc>,
    pub status: EntryStatus,
}

/// The `registry` document. Replaced wholesale on each hydration.
///
/// A default (never hydrated) registry has `version == 0` and no agents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Registry {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub agents: Vec<RegistryEntry>,
}

impl Registry {
    /// Whether this registry came from a hydration rather than empty state.
    pub fn is_hydrated(&self) -> bool {
        self.version > 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.iter().any(|a| a.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
