//! Ghost purge.
//!
//! A ghost is a name with echo or intent records but no registry entry. Ghosts
//! are never audited; purging removes their records.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;
use vigil_ledger::{decode_or_default, keys, read_or_default, LedgerStore};

use crate::domain::{EchoPulses, IntentRecord, Registry};
use crate::error::Result;
use crate::obs;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PurgeReport {
    pub ghosts: Vec<String>,
    pub echoes_removed: usize,
    pub intents_removed: usize,
}

/// Sorted ghost names given a registry and the recorded echoes and intents.
pub fn ghost_names(registry: &Registry, pulses: &EchoPulses, trail: &[IntentRecord]) -> Vec<String> {
    let names: BTreeSet<&str> = pulses
        .keys()
        .map(String::as_str)
        .chain(trail.iter().map(|r| r.agent.as_str()))
        .filter(|name| !registry.contains(name))
        .collect();
    names.into_iter().map(str::to_string).collect()
}

async fn load_state(store: &dyn LedgerStore) -> Result<(Registry, EchoPulses, Vec<IntentRecord>)> {
    let registry: Registry = read_or_default(store, keys::REGISTRY).await?;
    let pulses: EchoPulses = read_or_default(store, keys::ECHO_PULSES).await?;
    let trail: Vec<IntentRecord> = read_or_default(store, keys::INTENT_TRAIL).await?;
    Ok((registry, pulses, trail))
}

pub async fn find_ghosts(store: &dyn LedgerStore) -> Result<Vec<String>> {
    let (registry, pulses, trail) = load_state(store).await?;
    if !registry.is_hydrated() {
        return Ok(Vec::new());
    }
    Ok(ghost_names(&registry, &pulses, &trail))
}

/// Remove echo and intent records for every ghost.
///
/// With no hydrated registry every name would be a ghost, so nothing is
/// removed.
pub async fn purge_ghosts(store: Arc<dyn LedgerStore>) -> Result<PurgeReport> {
    let registry: Registry = read_or_default(&*store, keys::REGISTRY).await?;
    if !registry.is_hydrated() {
        warn!("registry has never been hydrated, skipping ghost purge");
        return Ok(PurgeReport::default());
    }

    let ghosts = find_ghosts(&*store).await?;
    if ghosts.is_empty() {
        return Ok(PurgeReport::default());
    }

    let canonical = registry.clone();
    let echoes_removed = Arc::new(AtomicUsize::new(0));
    let counter = echoes_removed.clone();
    store
        .update_atomic(
            keys::ECHO_PULSES,
            Box::new(move |current| {
                let mut pulses: EchoPulses = decode_or_default(keys::ECHO_PULSES, current);
                let before = pulses.len();
                pulses.retain(|name, _| canonical.contains(name));
                counter.store(before - pulses.len(), Ordering::Relaxed);
                Ok(serde_json::to_value(&pulses)?)
            }),
        )
        .await?;

    let intents_removed = Arc::new(AtomicUsize::new(0));
    let counter = intents_removed.clone();
    store
        .update_atomic(
            keys::INTENT_TRAIL,
            Box::new(move |current| {
                let mut trail: Vec<IntentRecord> = decode_or_default(keys::INTENT_TRAIL, current);
                let before = trail.len();
                trail.retain(|r| registry.contains(&r.agent));
                counter.store(before - trail.len(), Ordering::Relaxed);
                Ok(serde_json::to_value(&trail)?)
            }),
        )
        .await?;

    let report = PurgeReport {
        ghosts,
        echoes_removed: echoes_removed.load(Ordering::Relaxed),
        intents_removed: intents_removed.load(Ordering::Relaxed),
    };
    obs::emit_ghosts_purged(
        report.ghosts.len(),
        report.echoes_removed,
        report.intents_removed,
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::echo::EchoProtocol;
    use crate::enumerator::StaticEnumerator;
    use crate::intent::IntentTrail;
    use crate::registry::RegistryHydrator;
    use vigil_ledger::fakes::MemoryLedgerStore;

    #[tokio::test]
    async fn purge_removes_only_ghost_records() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let echo = EchoProtocol::new(store.clone(), clock.clone());
        let intent = IntentTrail::new(store.clone(), clock.clone());

        RegistryHydrator::new(store.clone(), clock.clone())
            .hydrate(&StaticEnumerator::from_names(["a"]))
            .await
            .unwrap();

        echo.commit_echo("a").await.unwrap();
        echo.commit_echo("old").await.unwrap();
        intent.declare_intent("a", None).await.unwrap();
        intent.declare_intent("old", None).await.unwrap();
        intent.declare_intent("stray", None).await.unwrap();

        assert_eq!(find_ghosts(&*store).await.unwrap(), vec!["old", "stray"]);

        let report = purge_ghosts(store.clone()).await.unwrap();
        assert_eq!(report.ghosts, vec!["old", "stray"]);
        assert_eq!(report.echoes_removed, 1);
        assert_eq!(report.intents_removed, 2);

        assert!(find_ghosts(&*store).await.unwrap().is_empty());
        assert!(echo.echo_for("a").await.unwrap().is_some());
        assert_eq!(intent.all_intents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unhydrated_registry_purges_nothing() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
        let clock = Arc::new(ManualClock::at_millis(0));
        EchoProtocol::new(store.clone(), clock)
            .commit_echo("a")
            .await
            .unwrap();

        let report = purge_ghosts(store.clone()).await.unwrap();
        assert_eq!(report, PurgeReport::default());
        assert!(find_ghosts(&*store).await.unwrap().is_empty());
    }
}
