//! Echo Protocol: per-agent liveness pulses.
//!
//! Committing and verifying are decoupled so independent verifiers (the audit
//! engine, the sentinel, operators) can apply their own thresholds against
//! the same pulses.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::instrument;
use vigil_ledger::{decode_or_default, keys, read_or_default, LedgerStore, StorageError};

use crate::clock::{elapsed_ms, exceeds, SharedClock};
use crate::domain::{EchoPulses, EchoRecord, EchoStatus};
use crate::error::{validate_agent, Result, VigilError};
use crate::metrics::METRICS;
use crate::obs;

/// Default freshness window for [`EchoProtocol::verify_echo`].
pub const DEFAULT_ECHO_THRESHOLD: Duration = Duration::from_millis(15_000);

/// Classify a pulse against `threshold` at time `now`. Fresh iff
/// `now - last_echo <= threshold`.
pub fn evaluate(record: Option<&EchoRecord>, now: DateTime<Utc>, threshold: Duration) -> EchoStatus {
    match record {
        None => EchoStatus::NotFound,
        Some(rec) => {
            let age_ms = elapsed_ms(now, rec.last_echo);
            if !exceeds(now, rec.last_echo, threshold) {
                EchoStatus::Fresh { age_ms }
            } else {
                EchoStatus::Stale { age_ms }
            }
        }
    }
}

pub struct EchoProtocol {
    store: Arc<dyn LedgerStore>,
    clock: SharedClock,
}

impl EchoProtocol {
    pub fn new(store: Arc<dyn LedgerStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Record a pulse for `agent` at the current time.
    ///
    /// The whole `echo_pulses` document is rewritten under the store's writer
    /// lock. If the stored pulse is newer than `now` (clock skew), it is kept.
    #[instrument(skip(self))]
    pub async fn commit_echo(&self, agent: &str) -> Result<EchoRecord> {
        validate_agent(agent)?;
        let now = self.clock.now();
        let name = agent.to_string();

        let doc = self
            .store
            .update_atomic(
                keys::ECHO_PULSES,
                Box::new(move |current| {
                    let mut pulses: EchoPulses = decode_or_default(keys::ECHO_PULSES, current);
                    let last_echo = match pulses.get(&name) {
                        Some(prev) if prev.last_echo > now => prev.last_echo,
                        _ => now,
                    };
                    pulses.insert(name.clone(), EchoRecord::new(&name, last_echo));
                    Ok(serde_json::to_value(&pulses)?)
                }),
            )
            .await?;

        let mut pulses: EchoPulses = decode_or_default(keys::ECHO_PULSES, Some(doc));
        let record = pulses.remove(agent).ok_or_else(|| {
            VigilError::Storage(StorageError::Backend(format!(
                "echo for {agent} missing after commit"
            )))
        })?;

        METRICS.inc_echoes();
        obs::emit_echo_committed(&record.agent, &record.integrity_hash);
        Ok(record)
    }

    /// Check `agent`'s latest pulse against `threshold`. Read-only.
    pub async fn verify_echo(&self, agent: &str, threshold: Duration) -> Result<EchoStatus> {
        let record = self.echo_for(agent).await?;
        Ok(evaluate(record.as_ref(), self.clock.now(), threshold))
    }

    pub async fn echo_for(&self, agent: &str) -> Result<Option<EchoRecord>> {
        let mut pulses = self.all_echoes().await?;
        Ok(pulses.remove(agent))
    }

    /// Every stored pulse, ghosts included.
    pub async fn all_echoes(&self) -> Result<EchoPulses> {
        Ok(read_or_default(&*self.store, keys::ECHO_PULSES).await?)
    }

    /// The most recent pulse across the whole fleet.
    pub async fn latest_echo(&self) -> Result<Option<EchoRecord>> {
        let pulses = self.all_echoes().await?;
        Ok(pulses.into_values().max_by_key(|r| r.last_echo))
    }
}
