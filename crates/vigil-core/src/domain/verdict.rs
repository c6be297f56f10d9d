//! Audit, certification, drift and sentinel outputs.
//!
//! These are caches of a verdict, re-derivable from echo, intent and registry
//! state at any time.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Why an audit subject failed. Serialized into [`AuditResult::reason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    NoEcho,
    StaleEcho,
    NoIntent,
    NonZeroExit,
    Timeout,
    RunnerError,
}

impl FailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailReason::NoEcho => "no_echo",
            FailReason::StaleEcho => "stale_echo",
            FailReason::NoIntent => "no_intent",
            FailReason::NonZeroExit => "non_zero_exit",
            FailReason::Timeout => "timeout",
            FailReason::RunnerError => "runner_error",
        }
    }

    /// Join reasons into the wire form (`"no_echo,no_intent"`).
    pub fn join(reasons: &[FailReason]) -> Option<String> {
        if reasons.is_empty() {
            return None;
        }
        Some(
            reasons
                .iter()
                .map(FailReason::as_str)
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for one canonical agent in one audit run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditResult {
    pub agent: String,
    /// `None` when the agent was not executed (non-strict mode, timeout, runner error).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub echo_fresh: bool,
    pub intent_declared: bool,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditResult {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

/// The `audit_results` document: one full audit run, written atomically.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub strict: bool,
    /// Registry order.
    pub results: Vec<AuditResult>,
}

impl AuditRun {
    pub fn result_for(&self, agent: &str) -> Option<&AuditResult> {
        self.results.iter().find(|r| r.agent == agent)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }
}

// ---------------------------------------------------------------------------
// Certification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArtifactStatus {
    /// Parses to a non-empty array or object.
    Ok,
    /// Parses to `[]`, `{}` or `null`.
    Empty,
    /// Absent, unparseable, or not a structured document.
    Unreadable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificationResult {
    /// Agent or module name.
    pub subject: String,
    pub verified_at: DateTime<Utc>,
    pub artifact_status: BTreeMap<String, ArtifactStatus>,
    /// True iff every required artifact is `OK`.
    pub certified: bool,
}

/// One certification pass over many subjects.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificationSnapshot {
    pub generated_at: DateTime<Utc>,
    pub results: BTreeMap<String, CertificationResult>,
}

impl CertificationSnapshot {
    pub fn is_certified(&self, subject: &str) -> Option<bool> {
        self.results.get(subject).map(|r| r.certified)
    }
}

// ---------------------------------------------------------------------------
// Drift and sentinel
// ---------------------------------------------------------------------------

/// Subjects that moved from certified to uncertified between two snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriftReport {
    pub generated_at: DateTime<Utc>,
    pub regressions: Vec<String>,
}

impl DriftReport {
    pub fn has_regressions(&self) -> bool {
        !self.regressions.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SentinelIncident {
    pub detected_at: DateTime<Utc>,
    /// Milliseconds since the newest echo in scope.
    pub silent_duration: u64,
    pub message: String,
    /// Set when the check was scoped to one agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_and_artifact_status_wire_names() {
        assert_eq!(serde_json::to_string(&Verdict::Pass).unwrap(), "\"PASS\"");
        assert_eq!(serde_json::to_string(&Verdict::Fail).unwrap(), "\"FAIL\"");
        assert_eq!(serde_json::to_string(&ArtifactStatus::Ok).unwrap(), "\"OK\"");
        assert_eq!(
            serde_json::to_string(&ArtifactStatus::Unreadable).unwrap(),
            "\"UNREADABLE\""
        );
    }

    #[test]
    fn sentinel_incident_field_names() {
        let incident = SentinelIncident {
            detected_at: DateTime::<Utc>::default(),
            silent_duration: 12_000,
            message: "fleet silent for 12000 ms".to_string(),
            agent: None,
        };
        let json = serde_json::to_value(&incident).unwrap();
        assert_eq!(json["silent_duration"], 12_000);
        assert!(json.get("agent").is_none());
        assert!(json.get("detected_at").is_some());
    }

    #[test]
    fn fail_reasons_join() {
        assert_eq!(FailReason::join(&[]), None);
        assert_eq!(
            FailReason::join(&[FailReason::NoEcho, FailReason::NoIntent]).as_deref(),
            Some("no_echo,no_intent")
        );
    }

    #[test]
    fn audit_run_counts() {
        let result = |agent: &str, verdict| AuditResult {
            agent: agent.to_string(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            echo_fresh: verdict == Verdict::Pass,
            intent_declared: verdict == Verdict::Pass,
            verdict,
            reason: None,
        };
        let run = AuditRun {
            results: vec![result("a", Verdict::Pass), result("b", Verdict::Fail)],
            ..AuditRun::default()
        };
        assert_eq!(run.passed_count(), 1);
        assert_eq!(run.failed_count(), 1);
        assert!(run.result_for("b").is_some());
    }
}
