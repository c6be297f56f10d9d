//! Vigil configuration.
//!
//! Defaults, then an optional TOML file, then `VIGIL_*` environment variables.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vigil_ledger::{FsLedgerStore, LedgerStore, SurrealLedgerStore};

use crate::audit::{AuditConfig, DEFAULT_AGENT_TIMEOUT, DEFAULT_MAX_CONCURRENCY};
use crate::clock::duration_ms;
use crate::echo::DEFAULT_ECHO_THRESHOLD;
use crate::error::{Result, VigilError};
use crate::sentinel::{SentinelConfig, DEFAULT_SENTINEL_THRESHOLD};
use crate::watch::{WatchConfig, DEFAULT_DRIFT_INTERVAL, DEFAULT_SENTINEL_INTERVAL};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// One JSON file per document under `ledger_dir`.
    #[default]
    Fs,
    Surreal,
}

impl std::str::FromStr for LedgerBackend {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fs" | "file" => Ok(LedgerBackend::Fs),
            "surreal" | "surrealdb" => Ok(LedgerBackend::Surreal),
            other => Err(VigilError::Config(format!("unknown ledger backend {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VigilConfig {
    pub ledger_dir: PathBuf,
    pub backend: LedgerBackend,
    /// `mem://`, `surrealkv://<path>` or `ws://host:port`. Defaults to a
    /// SurrealKV database inside `ledger_dir`.
    pub surreal_url: Option<String>,
    pub echo_threshold_ms: u64,
    pub sentinel_threshold_ms: u64,
    pub audit_timeout_ms: u64,
    pub audit_concurrency: usize,
    pub strict: bool,
    /// Program used to run agent sources in strict audits. `None` executes
    /// the source directly.
    pub agent_interpreter: Option<String>,
    pub sentinel_interval_secs: u64,
    pub drift_interval_secs: u64,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            ledger_dir: PathBuf::from(".vigil"),
            backend: LedgerBackend::Fs,
            surreal_url: None,
            echo_threshold_ms: duration_ms(DEFAULT_ECHO_THRESHOLD),
            sentinel_threshold_ms: duration_ms(DEFAULT_SENTINEL_THRESHOLD),
            audit_timeout_ms: duration_ms(DEFAULT_AGENT_TIMEOUT),
            audit_concurrency: DEFAULT_MAX_CONCURRENCY,
            strict: false,
            agent_interpreter: Some("node".to_string()),
            sentinel_interval_secs: DEFAULT_SENTINEL_INTERVAL.as_secs(),
            drift_interval_secs: DEFAULT_DRIFT_INTERVAL.as_secs(),
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| VigilError::Config(format!("{key}={raw:?}: {e}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(VigilError::Config(format!("{key}={raw:?}: expected a boolean"))),
    }
}

impl VigilConfig {
    /// Defaults overridden by `VIGIL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| VigilError::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&text)
            .map_err(|e| VigilError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Override fields from `lookup`, which maps variable names to values.
    pub fn apply_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VIGIL_LEDGER_DIR") {
            self.ledger_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("VIGIL_BACKEND") {
            self.backend = v.parse()?;
        }
        if let Some(v) = lookup("VIGIL_SURREAL_URL") {
            self.surreal_url = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("VIGIL_ECHO_THRESHOLD_MS") {
            self.echo_threshold_ms = parse("VIGIL_ECHO_THRESHOLD_MS", &v)?;
        }
        if let Some(v) = lookup("VIGIL_SENTINEL_THRESHOLD_MS") {
            self.sentinel_threshold_ms = parse("VIGIL_SENTINEL_THRESHOLD_MS", &v)?;
        }
        if let Some(v) = lookup("VIGIL_AUDIT_TIMEOUT_MS") {
            self.audit_timeout_ms = parse("VIGIL_AUDIT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("VIGIL_AUDIT_CONCURRENCY") {
            self.audit_concurrency = parse("VIGIL_AUDIT_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("VIGIL_STRICT") {
            self.strict = parse_bool("VIGIL_STRICT", &v)?;
        }
        if let Some(v) = lookup("VIGIL_AGENT_INTERPRETER") {
            self.agent_interpreter = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("VIGIL_SENTINEL_INTERVAL_SECS") {
            self.sentinel_interval_secs = parse("VIGIL_SENTINEL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("VIGIL_DRIFT_INTERVAL_SECS") {
            self.drift_interval_secs = parse("VIGIL_DRIFT_INTERVAL_SECS", &v)?;
        }
        Ok(self)
    }

    pub fn with_ledger_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ledger_dir = dir.into();
        self
    }

    pub fn with_backend(mut self, backend: LedgerBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_echo_threshold(mut self, threshold: Duration) -> Self {
        self.echo_threshold_ms = duration_ms(threshold);
        self
    }

    pub fn with_sentinel_threshold(mut self, threshold: Duration) -> Self {
        self.sentinel_threshold_ms = duration_ms(threshold);
        self
    }

    pub fn echo_threshold(&self) -> Duration {
        Duration::from_millis(self.echo_threshold_ms)
    }

    pub fn sentinel_threshold(&self) -> Duration {
        Duration::from_millis(self.sentinel_threshold_ms)
    }

    pub fn audit_config(&self) -> AuditConfig {
        AuditConfig::default()
            .with_strict(self.strict)
            .with_echo_threshold(self.echo_threshold())
            .with_max_concurrency(self.audit_concurrency)
            .with_agent_timeout(Duration::from_millis(self.audit_timeout_ms))
    }

    pub fn sentinel_config(&self) -> SentinelConfig {
        SentinelConfig {
            threshold: self.sentinel_threshold(),
            ..SentinelConfig::default()
        }
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            sentinel_interval: Duration::from_secs(self.sentinel_interval_secs.max(1)),
            drift_interval: Duration::from_secs(self.drift_interval_secs.max(1)),
            sentinel: self.sentinel_config(),
        }
    }

    /// Open the configured ledger backend.
    pub async fn open_store(&self) -> Result<Arc<dyn LedgerStore>> {
        match self.backend {
            LedgerBackend::Fs => Ok(Arc::new(FsLedgerStore::new(&self.ledger_dir)?)),
            LedgerBackend::Surreal => {
                let url = match &self.surreal_url {
                    Some(url) => url.clone(),
                    None => format!("surrealkv://{}", self.ledger_dir.join("surreal").display()),
                };
                Ok(Arc::new(SurrealLedgerStore::connect(&url).await?))
            }
        }
    }
}
