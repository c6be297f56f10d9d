//! Audit Engine: evaluates every canonical agent and records one `AuditRun`.
//!
//! An agent passes when its echo is fresh and it has declared intent. In
//! strict mode it must also run to a zero exit within the per-agent timeout.
//! Agents execute on a bounded pool; results keep registry order.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::Instrument;
use uuid::Uuid;
use vigil_ledger::{keys, put_typed, read_or_default, LedgerStore};

use crate::clock::{duration_ms, elapsed_ms, SharedClock};
use crate::domain::{
    AuditResult, AuditRun, EchoPulses, EchoStatus, FailReason, IntentRecord, Registry,
    RegistryEntry, Verdict,
};
use crate::echo::{self, DEFAULT_ECHO_THRESHOLD};
use crate::error::{Result, VigilError};
use crate::intent;
use crate::metrics::METRICS;
use crate::obs;
use crate::runner::{ProcessOutput, ProcessRunner, RunnerError};

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub echo_threshold: Duration,
    /// Only count intents declared after this instant. `None` accepts any
    /// declaration ever made.
    pub intent_since: Option<DateTime<Utc>>,
    pub strict: bool,
    pub max_concurrency: usize,
    pub agent_timeout: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            echo_threshold: DEFAULT_ECHO_THRESHOLD,
            intent_since: None,
            strict: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }
}

impl AuditConfig {
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_echo_threshold(mut self, threshold: Duration) -> Self {
        self.echo_threshold = threshold;
        self
    }

    pub fn with_intent_since(mut self, since: DateTime<Utc>) -> Self {
        self.intent_since = Some(since);
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }
}

/// Outcome of executing one agent in strict mode.
enum Execution {
    Finished(ProcessOutput),
    TimedOut,
    Failed(String),
}

pub struct AuditEngine {
    store: Arc<dyn LedgerStore>,
    clock: SharedClock,
    runner: Option<Arc<dyn ProcessRunner>>,
    config: AuditConfig,
}

impl AuditEngine {
    pub fn new(store: Arc<dyn LedgerStore>, clock: SharedClock, config: AuditConfig) -> Self {
        Self {
            store,
            clock,
            runner: None,
            config,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Audit every registry agent and replace `audit_results` with the run.
    ///
    /// Agent failures are verdicts, not errors. Only storage failures (and a
    /// strict run with no runner configured) return `Err`; a failed write
    /// leaves the previous run in place.
    pub async fn run(&self) -> Result<AuditRun> {
        if self.config.strict && self.runner.is_none() {
            return Err(VigilError::Config(
                "strict audit requires a process runner".to_string(),
            ));
        }

        let run_id = Uuid::new_v4().to_string();
        let span = obs::audit_span(&run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: String) -> Result<AuditRun> {
        let started_at = self.clock.now();

        let registry: Registry = read_or_default(&*self.store, keys::REGISTRY).await?;
        let pulses: EchoPulses = read_or_default(&*self.store, keys::ECHO_PULSES).await?;
        let trail: Vec<IntentRecord> = read_or_default(&*self.store, keys::INTENT_TRAIL).await?;

        obs::emit_audit_started(&run_id, registry.len(), self.config.strict);

        let executions: Vec<Option<Execution>> = if self.config.strict {
            stream::iter(registry.agents.iter())
                .map(|entry| async move { Some(self.execute(entry).await) })
                .buffered(self.config.max_concurrency.max(1))
                .collect()
                .await
        } else {
            registry.agents.iter().map(|_| None).collect()
        };

        let results: Vec<AuditResult> = registry
            .agents
            .iter()
            .zip(executions)
            .map(|(entry, execution)| {
                self.judge(&entry.name, &pulses, &trail, started_at, execution)
            })
            .collect();

        let run = AuditRun {
            run_id,
            started_at,
            finished_at: self.clock.now(),
            strict: self.config.strict,
            results,
        };

        put_typed(&*self.store, keys::AUDIT_RESULTS, &run).await?;

        METRICS.inc_audits();
        METRICS.add_agents_failed(run.failed_count() as u64);
        obs::emit_audit_finished(
            &run.run_id,
            run.passed_count(),
            run.failed_count(),
            elapsed_ms(run.finished_at, run.started_at),
        );
        Ok(run)
    }

    async fn execute(&self, entry: &RegistryEntry) -> Execution {
        let Some(runner) = &self.runner else {
            return Execution::Failed("no process runner configured".to_string());
        };
        let timeout = self.config.agent_timeout;

        // The outer timeout guards runners that ignore their deadline.
        match tokio::time::timeout(timeout, runner.run(&entry.source_ref, timeout)).await {
            Ok(Ok(output)) => Execution::Finished(output),
            Ok(Err(RunnerError::Timeout { .. })) | Err(_) => {
                obs::emit_agent_timeout(&entry.name, duration_ms(timeout));
                Execution::TimedOut
            }
            Ok(Err(e)) => Execution::Failed(e.to_string()),
        }
    }

    fn judge(
        &self,
        agent: &str,
        pulses: &EchoPulses,
        trail: &[IntentRecord],
        now: DateTime<Utc>,
        execution: Option<Execution>,
    ) -> AuditResult {
        let mut reasons = Vec::new();

        let echo_status = echo::evaluate(pulses.get(agent), now, self.config.echo_threshold);
        let echo_fresh = echo_status.is_fresh();
        if !echo_fresh {
            reasons.push(match echo_status {
                EchoStatus::NotFound => FailReason::NoEcho,
                _ => FailReason::StaleEcho,
            });
        }

        let intent_declared = intent::declared_since(trail, agent, self.config.intent_since);
        if !intent_declared {
            reasons.push(FailReason::NoIntent);
        }

        let (exit_code, stdout, stderr) = match execution {
            None => (None, String::new(), String::new()),
            Some(Execution::Finished(output)) => {
                if !output.succeeded() {
                    reasons.push(FailReason::NonZeroExit);
                }
                (output.exit_code, output.stdout, output.stderr)
            }
            Some(Execution::TimedOut) => {
                reasons.push(FailReason::Timeout);
                (None, String::new(), String::new())
            }
            Some(Execution::Failed(message)) => {
                reasons.push(FailReason::RunnerError);
                (None, String::new(), message)
            }
        };

        let verdict = if reasons.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        AuditResult {
            agent: agent.to_string(),
            exit_code,
            stdout,
            stderr,
            echo_fresh,
            intent_declared,
            verdict,
            reason: FailReason::join(&reasons),
        }
    }

    /// The most recent stored run, or an empty run when none exists.
    pub async fn latest_run(&self) -> Result<AuditRun> {
        Ok(read_or_default(&*self.store, keys::AUDIT_RESULTS).await?)
    }
}
