//! Drift Detector: flags subjects that lost certification between snapshots.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use vigil_ledger::{keys, put_typed, read_or_default, LedgerStore};

use crate::clock::SharedClock;
use crate::domain::{CertificationSnapshot, DriftReport};
use crate::error::Result;
use crate::metrics::METRICS;
use crate::obs;

/// Subjects certified in `prev` and uncertified in `curr`, sorted.
///
/// Improvements and subjects present on one side only are not regressions.
pub fn diff(prev: &CertificationSnapshot, curr: &CertificationSnapshot, now: DateTime<Utc>) -> DriftReport {
    // BTreeMap iteration keeps the output sorted by subject.
    let regressions = curr
        .results
        .iter()
        .filter(|(subject, result)| {
            !result.certified && prev.is_certified(subject) == Some(true)
        })
        .map(|(subject, _)| subject.clone())
        .collect();

    DriftReport {
        generated_at: now,
        regressions,
    }
}

pub struct DriftDetector {
    store: Arc<dyn LedgerStore>,
    clock: SharedClock,
}

impl DriftDetector {
    pub fn new(store: Arc<dyn LedgerStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Compare the previous and current certification snapshots and persist
    /// the report to `drift_report`.
    pub async fn check(&self) -> Result<DriftReport> {
        let prev: CertificationSnapshot =
            read_or_default(&*self.store, keys::CERTIFICATION_PREVIOUS).await?;
        let curr: CertificationSnapshot =
            read_or_default(&*self.store, keys::CERTIFICATION_CURRENT).await?;

        let report = diff(&prev, &curr, self.clock.now());
        put_typed(&*self.store, keys::DRIFT_REPORT, &report).await?;

        for subject in &report.regressions {
            obs::emit_drift_regression(subject);
        }
        METRICS.add_regressions(report.regressions.len() as u64);
        Ok(report)
    }

    pub async fn latest_report(&self) -> Result<DriftReport> {
        Ok(read_or_default(&*self.store, keys::DRIFT_REPORT).await?)
    }
}
