//! Persisted record shapes.
//!
//! Field names here are the wire format of the ledger; dashboards and other
//! tools read these documents directly, so renames are breaking changes.

pub mod liveness;
pub mod registry;
pub mod verdict;

pub use liveness::{EchoPulses, EchoRecord, EchoStatus, IntentRecord, PulseStatus};
pub use registry::{AgentSource, EntryStatus, Registry, RegistryEntry, REGISTRY_SCHEMA_VERSION};
pub use verdict::{
    ArtifactStatus, AuditResult, AuditRun, CertificationResult, CertificationSnapshot,
    DriftReport, FailReason, SentinelIncident, Verdict,
};
