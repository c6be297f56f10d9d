//! Structured observability hooks for Vigil lifecycle events.
//!
//! This module provides:
//! - An audit-scoped tracing span (`audit_span`)
//! - Emission functions for echo commits, hydration, audits, certification,
//!   drift regressions and sentinel incidents
//!
//! Events are emitted at `info!` level unless noted (configurable via `RUST_LOG`).

use tracing::{info, warn};

/// Span carried by every event of one audit run.
///
/// Attach with `tracing::Instrument::instrument` so the run future stays `Send`:
///
/// ```ignore
/// engine.run_inner().instrument(obs::audit_span(&run_id)).await
/// ```
pub fn audit_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("vigil.audit", run_id = %run_id)
}

pub fn emit_echo_committed(agent: &str, integrity_hash: &str) {
    tracing::debug!(event = "echo.committed", agent = %agent, integrity_hash = %integrity_hash);
}

pub fn emit_intent_declared(agent: &str) {
    tracing::debug!(event = "intent.declared", agent = %agent);
}

pub fn emit_registry_hydrated(agent_count: usize) {
    info!(event = "registry.hydrated", agent_count = agent_count);
}

/// Emit event: hydration failed and the prior registry was kept (warning level).
pub fn emit_hydration_failed(error: &dyn std::fmt::Display) {
    warn!(event = "registry.hydration_failed", error = %error);
}

pub fn emit_ghosts_purged(ghosts: usize, echoes_removed: usize, intents_removed: usize) {
    info!(
        event = "ghosts.purged",
        ghosts = ghosts,
        echoes_removed = echoes_removed,
        intents_removed = intents_removed,
    );
}

pub fn emit_audit_started(run_id: &str, agent_count: usize, strict: bool) {
    info!(event = "audit.started", run_id = %run_id, agent_count = agent_count, strict = strict);
}

pub fn emit_audit_finished(run_id: &str, passed: usize, failed: usize, duration_ms: u64) {
    info!(
        event = "audit.finished",
        run_id = %run_id,
        passed = passed,
        failed = failed,
        duration_ms = duration_ms,
    );
}

/// Emit event: an agent exceeded its execution timeout (warning level).
pub fn emit_agent_timeout(agent: &str, timeout_ms: u64) {
    warn!(event = "audit.agent_timeout", agent = %agent, timeout_ms = timeout_ms);
}

pub fn emit_certification_finished(subjects: usize, certified: usize) {
    info!(event = "certification.finished", subjects = subjects, certified = certified);
}

/// Emit event: a subject regressed from certified to uncertified (warning level).
pub fn emit_drift_regression(subject: &str) {
    warn!(event = "drift.regression", subject = %subject);
}

/// Emit event: the fleet (or one agent) went silent (warning level).
pub fn emit_sentinel_incident(silent_duration: u64, agent: Option<&str>) {
    warn!(
        event = "sentinel.incident",
        silent_duration = silent_duration,
        agent = agent.unwrap_or("*"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_span_create() {
        let span = audit_span("test-run-id");
        let _entered = span.enter();
    }
}
