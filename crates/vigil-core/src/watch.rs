//! Periodic Sentinel and Drift loops.
//!
//! Each loop runs on its own `tokio::time::interval` and stops when the shared
//! shutdown channel flips to `true`. A failing tick is logged and the loop
//! carries on.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use vigil_ledger::LedgerStore;

use crate::clock::SharedClock;
use crate::drift::DriftDetector;
use crate::error::Result;
use crate::metrics::METRICS;
use crate::sentinel::{Sentinel, SentinelConfig};

pub const DEFAULT_SENTINEL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_DRIFT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub sentinel_interval: Duration,
    pub drift_interval: Duration,
    pub sentinel: SentinelConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            sentinel_interval: DEFAULT_SENTINEL_INTERVAL,
            drift_interval: DEFAULT_DRIFT_INTERVAL,
            sentinel: SentinelConfig::default(),
        }
    }
}

/// Run `task` every `period` until `shutdown` reads `true` or its sender is
/// dropped. The first tick fires immediately.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut task: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(loop_name = name, period_ms = period.as_millis() as u64, "periodic check started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = task().await {
                        warn!(loop_name = name, error = %e, "periodic check failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(loop_name = name, "periodic check stopped");
    })
}

/// Owns the running Sentinel and Drift loops.
pub struct Watchtower {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Watchtower {
    pub fn start(store: Arc<dyn LedgerStore>, clock: SharedClock, config: WatchConfig) -> Self {
        let (tx, rx) = watch::channel(false);

        let sentinel = Arc::new(Sentinel::new(store.clone(), clock.clone()));
        let sentinel_config = Arc::new(config.sentinel.clone());
        let sentinel_loop = spawn_periodic("sentinel", config.sentinel_interval, rx.clone(), move || {
            let sentinel = sentinel.clone();
            let cfg = sentinel_config.clone();
            async move {
                sentinel.check_and_record(&cfg).await?;
                Ok(())
            }
        });

        let drift = Arc::new(DriftDetector::new(store, clock));
        let drift_loop = spawn_periodic("drift", config.drift_interval, rx, move || {
            let drift = drift.clone();
            async move {
                drift.check().await?;
                METRICS.flush();
                Ok(())
            }
        });

        Self {
            shutdown: tx,
            handles: vec![sentinel_loop, drift_loop],
        }
    }

    /// Signal both loops and wait for them to finish their current tick.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "watch loop ended abnormally");
            }
        }
    }
}
