//! Vigil Core Library
//!
//! Agent liveness and trust certification: agents prove they are alive
//! (echo), declare what they intend to do (intent), and are audited against a
//! canonical registry. Certification snapshots feed drift detection, and a
//! sentinel alerts when the fleet goes silent.
//!
//! Every component reads and writes through a [`vigil_ledger::LedgerStore`].

pub mod audit;
pub mod certification;
pub mod clock;
pub mod config;
pub mod domain;
pub mod drift;
pub mod echo;
pub mod enumerator;
mod error;
pub mod ghosts;
pub mod intent;
pub mod metrics;
pub mod obs;
pub mod registry;
pub mod runner;
pub mod sentinel;
pub mod telemetry;
pub mod watch;

pub use audit::{AuditConfig, AuditEngine};
pub use certification::{
    ArtifactSource, CertificationEngine, CertificationSubject, DirArtifactSource, SubjectKind,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{LedgerBackend, VigilConfig};
pub use domain::{
    AgentSource, ArtifactStatus, AuditResult, AuditRun, CertificationResult,
    CertificationSnapshot, DriftReport, EchoRecord, EchoStatus, IntentRecord, Registry,
    SentinelIncident, Verdict,
};
pub use drift::DriftDetector;
pub use echo::EchoProtocol;
pub use enumerator::{AgentSourceEnumerator, DirectoryEnumerator, ManifestEnumerator, StaticEnumerator};
pub use error::{Result, VigilError};
pub use ghosts::{find_ghosts, purge_ghosts, PurgeReport};
pub use intent::IntentTrail;
pub use registry::RegistryHydrator;
pub use runner::{CommandRunner, ProcessOutput, ProcessRunner, RunnerError};
pub use sentinel::{RecordMode, Sentinel, SentinelConfig, SentinelScope};
pub use watch::{WatchConfig, Watchtower};

/// Crate version, reported by the CLI `status` command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
