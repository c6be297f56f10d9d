//! Registry Hydrator: rebuilds the canonical agent set from an enumerator.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;
use vigil_ledger::{keys, put_typed, read_or_default, LedgerStore};

use crate::clock::SharedClock;
use crate::domain::{AgentSource, EntryStatus, Registry, RegistryEntry, REGISTRY_SCHEMA_VERSION};
use crate::enumerator::AgentSourceEnumerator;
use crate::error::{validate_agent, Result, VigilError};
use crate::obs;

/// Build a fresh registry from `sources`, in source order.
///
/// Rejects empty or whitespace-padded names and duplicates; nothing is merged from earlier registries.
pub fn build_registry(sources: Vec<AgentSource>, now: DateTime<Utc>) -> Result<Registry> {
    let mut seen = HashSet::new();
    let mut agents = Vec::with_capacity(sources.len());

    for source in sources {
        validate_agent(&source.name)?;
        if !seen.insert(source.name.clone()) {
            return Err(VigilError::DuplicateAgent(source.name));
        }
        agents.push(RegistryEntry {
            name: source.name,
            source_ref: source.source_ref,
            registered_at: now,
            status: EntryStatus::Hydrated,
        });
    }

    Ok(Registry {
        version: REGISTRY_SCHEMA_VERSION,
        generated_at: now,
        agents,
    })
}

pub struct RegistryHydrator {
    store: Arc<dyn LedgerStore>,
    clock: SharedClock,
}

impl RegistryHydrator {
    pub fn new(store: Arc<dyn LedgerStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Replace the stored registry with one built from `enumerator`.
    ///
    /// Any enumerator or validation failure returns before the write, so the
    /// prior registry stays in place.
    #[instrument(skip_all)]
    pub async fn hydrate(&self, enumerator: &dyn AgentSourceEnumerator) -> Result<Registry> {
        let registry = enumerator
            .list_sources()
            .await
            .and_then(|sources| build_registry(sources, self.clock.now()))
            .inspect_err(|e| obs::emit_hydration_failed(e))?;

        put_typed(&*self.store, keys::REGISTRY, &registry).await?;
        obs::emit_registry_hydrated(registry.len());
        Ok(registry)
    }

    pub async fn load_registry(&self) -> Result<Registry> {
        Ok(read_or_default(&*self.store, keys::REGISTRY).await?)
    }

    /// Copy the current registry to `registry_snapshot`.
    pub async fn snapshot_registry(&self) -> Result<Registry> {
        let current = self.load_registry().await?;
        put_typed(&*self.store, keys::REGISTRY_SNAPSHOT, &current).await?;
        Ok(current)
    }

    pub async fn load_snapshot(&self) -> Result<Registry> {
        Ok(read_or_default(&*self.store, keys::REGISTRY_SNAPSHOT).await?)
    }
}
