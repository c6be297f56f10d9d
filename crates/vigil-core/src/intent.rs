//! Intent Trail: append-only declarations of what agents mean to do.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use vigil_ledger::{append_typed, keys, read_or_default, LedgerStore};

use crate::clock::SharedClock;
use crate::domain::IntentRecord;
use crate::error::{validate_agent, Result};
use crate::obs;

/// Whether `trail` holds a declaration by `agent`, optionally only those
/// strictly after `since`.
pub fn declared_since(trail: &[IntentRecord], agent: &str, since: Option<DateTime<Utc>>) -> bool {
    trail
        .iter()
        .any(|r| r.agent == agent && since.map_or(true, |s| r.declared_at > s))
}

pub struct IntentTrail {
    store: Arc<dyn LedgerStore>,
    clock: SharedClock,
}

impl IntentTrail {
    pub fn new(store: Arc<dyn LedgerStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Append a declaration. Repeated declarations are all kept.
    pub async fn declare_intent(&self, agent: &str, payload: Option<Value>) -> Result<IntentRecord> {
        validate_agent(agent)?;
        let record = IntentRecord {
            agent: agent.to_string(),
            declared_at: self.clock.now(),
            payload,
        };
        append_typed(&*self.store, keys::INTENT_TRAIL, &record).await?;
        obs::emit_intent_declared(agent);
        Ok(record)
    }

    pub async fn has_recent_intent(&self, agent: &str, since: Option<DateTime<Utc>>) -> Result<bool> {
        let trail = self.all_intents().await?;
        Ok(declared_since(&trail, agent, since))
    }

    /// Declarations by `agent`, oldest first.
    pub async fn intents_for(&self, agent: &str) -> Result<Vec<IntentRecord>> {
        let trail = self.all_intents().await?;
        Ok(trail.into_iter().filter(|r| r.agent == agent).collect())
    }

    pub async fn all_intents(&self) -> Result<Vec<IntentRecord>> {
        Ok(read_or_default(&*self.store, keys::INTENT_TRAIL).await?)
    }
}
