//! Injectable time source.
//!
//! Every staleness decision in Vigil reads time through [`Clock`] so tests can
//! pin or advance it. Production code uses [`SystemClock`].

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

/// Abstraction over wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Shared handle passed to every component.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Start at `ms` milliseconds after the UNIX epoch.
    pub fn at_millis(ms: i64) -> Self {
        let start = Utc
            .timestamp_millis_opt(ms)
            .single()
            .unwrap_or_default();
        Self::new(start)
    }

    pub fn advance(&self, by: Duration) {
        if let (Ok(mut now), Ok(by)) = (self.now.lock(), chrono::Duration::from_std(by)) {
            *now += by;
        }
    }

    /// Move the clock backwards, as a skewed host would.
    pub fn rewind(&self, by: Duration) {
        if let (Ok(mut now), Ok(by)) = (self.now.lock(), chrono::Duration::from_std(by)) {
            *now -= by;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map(|now| *now)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

/// Milliseconds from `then` to `now`, zero when `then` is in the future.
pub fn elapsed_ms(now: DateTime<Utc>, then: DateTime<Utc>) -> u64 {
    (now - then).num_milliseconds().max(0) as u64
}

/// True iff strictly more than `threshold` separates `then` from `now`.
/// Compared at full clock precision; milliseconds are for reporting only.
pub fn exceeds(now: DateTime<Utc>, then: DateTime<Utc>, threshold: Duration) -> bool {
    match chrono::Duration::from_std(threshold) {
        Ok(limit) => now - then > limit,
        Err(_) => false,
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
