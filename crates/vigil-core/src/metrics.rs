//! Global atomic counters for Vigil observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a watch tick).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    echoes_committed: AtomicU64,
    audits_run: AtomicU64,
    agents_failed: AtomicU64,
    incidents_raised: AtomicU64,
    regressions_detected: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            echoes_committed: AtomicU64::new(0),
            audits_run: AtomicU64::new(0),
            agents_failed: AtomicU64::new(0),
            incidents_raised: AtomicU64::new(0),
            regressions_detected: AtomicU64::new(0),
        }
    }

    pub fn inc_echoes(&self) {
        self.echoes_committed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "echoes_committed", "counter incremented");
    }

    pub fn inc_audits(&self) {
        self.audits_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "audits_run", "counter incremented");
    }

    pub fn add_agents_failed(&self, n: u64) {
        self.agents_failed.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "agents_failed", n = n, "counter incremented");
    }

    pub fn inc_incidents(&self) {
        self.incidents_raised.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "incidents_raised", "counter incremented");
    }

    pub fn add_regressions(&self, n: u64) {
        self.regressions_detected.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "regressions_detected", n = n, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            echoes_committed = self.echoes_committed(),
            audits_run = self.audits_run(),
            agents_failed = self.agents_failed(),
            incidents_raised = self.incidents_raised(),
            regressions_detected = self.regressions_detected(),
        );
    }

    pub fn echoes_committed(&self) -> u64 {
        self.echoes_committed.load(Ordering::Relaxed)
    }

    pub fn audits_run(&self) -> u64 {
        self.audits_run.load(Ordering::Relaxed)
    }

    pub fn agents_failed(&self) -> u64 {
        self.agents_failed.load(Ordering::Relaxed)
    }

    pub fn incidents_raised(&self) -> u64 {
        self.incidents_raised.load(Ordering::Relaxed)
    }

    pub fn regressions_detected(&self) -> u64 {
        self.regressions_detected.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.echoes_committed.store(0, Ordering::Relaxed);
        self.audits_run.store(0, Ordering::Relaxed);
        self.agents_failed.store(0, Ordering::Relaxed);
        self.incidents_raised.store(0, Ordering::Relaxed);
        self.regressions_detected.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_counters_increment() {
        let m = Metrics::new();
        m.inc_echoes();
        m.inc_echoes();
        m.add_agents_failed(3);
        assert_eq!(m.echoes_committed(), 2);
        assert_eq!(m.agents_failed(), 3);

        m.reset();
        assert_eq!(m.echoes_committed(), 0);
    }
}
