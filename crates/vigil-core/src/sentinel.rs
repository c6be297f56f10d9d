//! Silent-Failure Sentinel.
//!
//! Raises an incident when the newest echo in scope is older than the
//! threshold. Stateless apart from ledger reads.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use vigil_ledger::{append_typed, keys, put_typed, read_or_default, LedgerStore};

use crate::clock::{elapsed_ms, exceeds, SharedClock};
use crate::domain::{EchoPulses, SentinelIncident};
use crate::error::Result;
use crate::metrics::METRICS;
use crate::obs;

pub const DEFAULT_SENTINEL_THRESHOLD: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentinelScope {
    /// The most recent echo across all agents.
    Fleet,
    Agent(String),
}

impl SentinelScope {
    fn agent(&self) -> Option<&str> {
        match self {
            SentinelScope::Fleet => None,
            SentinelScope::Agent(name) => Some(name),
        }
    }
}

/// How [`Sentinel::record`] stores an incident.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordMode {
    /// Replace `sentinel_incident`.
    #[default]
    Overwrite,
    /// Append to `sentinel_incidents`.
    Append,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub threshold: Duration,
    pub scope: SentinelScope,
    pub record_mode: RecordMode,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SENTINEL_THRESHOLD,
            scope: SentinelScope::Fleet,
            record_mode: RecordMode::Overwrite,
        }
    }
}

pub struct Sentinel {
    store: Arc<dyn LedgerStore>,
    clock: SharedClock,
}

impl Sentinel {
    pub fn new(store: Arc<dyn LedgerStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// An incident iff the newest echo in `scope` is more than `threshold` old.
    ///
    /// No echo in scope means nothing to be stale against: no incident.
    pub async fn check(&self, threshold: Duration, scope: &SentinelScope) -> Result<Option<SentinelIncident>> {
        let pulses: EchoPulses = read_or_default(&*self.store, keys::ECHO_PULSES).await?;
        let last = match scope {
            SentinelScope::Fleet => pulses.values().map(|r| r.last_echo).max(),
            SentinelScope::Agent(name) => pulses.get(name).map(|r| r.last_echo),
        };

        let Some(last) = last else {
            debug!(scope = ?scope, "no echo in scope, sentinel has nothing to check");
            return Ok(None);
        };

        let now = self.clock.now();
        if !exceeds(now, last, threshold) {
            return Ok(None);
        }
        let silent_ms = elapsed_ms(now, last);

        let message = match scope.agent() {
            Some(agent) => format!("agent {agent} silent for {silent_ms} ms"),
            None => format!("fleet silent for {silent_ms} ms"),
        };
        Ok(Some(SentinelIncident {
            detected_at: now,
            silent_duration: silent_ms,
            message,
            agent: scope.agent().map(str::to_string),
        }))
    }

    pub async fn record(&self, incident: &SentinelIncident, mode: RecordMode) -> Result<()> {
        match mode {
            RecordMode::Overwrite => {
                put_typed(&*self.store, keys::SENTINEL_INCIDENT, incident).await?
            }
            RecordMode::Append => {
                append_typed(&*self.store, keys::SENTINEL_INCIDENTS, incident).await?
            }
        }
        METRICS.inc_incidents();
        obs::emit_sentinel_incident(incident.silent_duration, incident.agent.as_deref());
        Ok(())
    }

    /// One sentinel tick: check, and record any incident.
    pub async fn check_and_record(&self, config: &SentinelConfig) -> Result<Option<SentinelIncident>> {
        let incident = self.check(config.threshold, &config.scope).await?;
        if let Some(incident) = &incident {
            self.record(incident, config.record_mode).await?;
        }
        Ok(incident)
    }

    pub async fn last_incident(&self) -> Result<Option<SentinelIncident>> {
        Ok(read_or_default(&*self.store, keys::SENTINEL_INCIDENT).await?)
    }

    pub async fn incident_log(&self) -> Result<Vec<SentinelIncident>> {
        Ok(read_or_default(&*self.store, keys::SENTINEL_INCIDENTS).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::echo::EchoProtocol;
    use vigil_ledger::fakes::MemoryLedgerStore;

    fn setup() -> (ManualClock, EchoProtocol, Sentinel) {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
        let clock = ManualClock::at_millis(1_700_000_000_000);
        let shared: SharedClock = Arc::new(clock.clone());
        (
            clock,
            EchoProtocol::new(store.clone(), shared.clone()),
            Sentinel::new(store, shared),
        )
    }

    #[tokio::test]
    async fn no_echo_no_incident() {
        let (_clock, _echo, sentinel) = setup();
        let incident = sentinel
            .check(DEFAULT_SENTINEL_THRESHOLD, &SentinelScope::Fleet)
            .await
            .unwrap();
        assert!(incident.is_none());
    }

    #[tokio::test]
    async fn fleet_scope_uses_newest_echo() {
        let (clock, echo, sentinel) = setup();
        echo.commit_echo("old").await.unwrap();
        clock.advance(Duration::from_secs(8));
        echo.commit_echo("new").await.unwrap();
        clock.advance(Duration::from_secs(5));

        // "old" is 13s silent but "new" is only 5s
        assert!(sentinel
            .check(DEFAULT_SENTINEL_THRESHOLD, &SentinelScope::Fleet)
            .await
            .unwrap()
            .is_none());

        let incident = sentinel
            .check(DEFAULT_SENTINEL_THRESHOLD, &SentinelScope::Agent("old".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(incident.silent_duration, 13_000);
        assert_eq!(incident.agent.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn threshold_is_exclusive() {
        let (clock, echo, sentinel) = setup();
        echo.commit_echo("a").await.unwrap();
        clock.advance(DEFAULT_SENTINEL_THRESHOLD);
        assert!(sentinel
            .check(DEFAULT_SENTINEL_THRESHOLD, &SentinelScope::Fleet)
            .await
            .unwrap()
            .is_none());

        clock.advance(Duration::from_millis(1));
        let incident = sentinel
            .check(DEFAULT_SENTINEL_THRESHOLD, &SentinelScope::Fleet)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(incident.silent_duration, 10_001);
        assert!(incident.agent.is_none());
    }

    #[tokio::test]
    async fn sub_millisecond_overrun_raises_incident() {
        let (clock, echo, sentinel) = setup();
        echo.commit_echo("a").await.unwrap();
        clock.advance(Duration::from_micros(10_000_900));

        let incident = sentinel
            .check(DEFAULT_SENTINEL_THRESHOLD, &SentinelScope::Fleet)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(incident.silent_duration, 10_000);
    }

    #[tokio::test]
    async fn record_modes() {
        let (clock, echo, sentinel) = setup();
        echo.commit_echo("a").await.unwrap();
        clock.advance(Duration::from_secs(20));

        let append = SentinelConfig {
            record_mode: RecordMode::Append,
            ..SentinelConfig::default()
        };
        sentinel.check_and_record(&append).await.unwrap();
        clock.advance(Duration::from_secs(1));
        sentinel.check_and_record(&append).await.unwrap();
        assert_eq!(sentinel.incident_log().await.unwrap().len(), 2);
        assert!(sentinel.last_incident().await.unwrap().is_none());

        let incident = sentinel
            .check_and_record(&SentinelConfig::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sentinel.last_incident().await.unwrap(), Some(incident));
    }
}
