//! Shared fixtures for vigil-core integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vigil_core::{
    EchoProtocol, IntentTrail, ManualClock, ProcessOutput, ProcessRunner, RegistryHydrator,
    RunnerError, SharedClock, StaticEnumerator,
};
use vigil_ledger::LedgerStore;

pub const T0_MS: i64 = 1_700_000_000_000;

/// One ledger, one manual clock, and the components built on them.
pub struct Fleet {
    pub store: Arc<dyn LedgerStore>,
    pub clock: ManualClock,
    pub echo: EchoProtocol,
    pub intent: IntentTrail,
    pub hydrator: RegistryHydrator,
}

impl Fleet {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        let clock = ManualClock::at_millis(T0_MS);
        let shared: SharedClock = Arc::new(clock.clone());
        Self {
            echo: EchoProtocol::new(store.clone(), shared.clone()),
            intent: IntentTrail::new(store.clone(), shared.clone()),
            hydrator: RegistryHydrator::new(store.clone(), shared),
            store,
            clock,
        }
    }

    pub fn shared_clock(&self) -> SharedClock {
        Arc::new(self.clock.clone())
    }

    pub async fn hydrate(&self, names: &[&str]) {
        self.hydrator
            .hydrate(&StaticEnumerator::from_names(names.iter().copied()))
            .await
            .expect("hydrate");
    }

    /// Echo and declare intent for `agent` at the current instant.
    pub async fn healthy(&self, agent: &str) {
        self.echo.commit_echo(agent).await.expect("echo");
        self.intent.declare_intent(agent, None).await.expect("intent");
    }
}

#[derive(Debug, Clone)]
pub enum Script {
    Exit(i32),
    Hang(Duration),
    SpawnFails,
}

/// A process runner that replays scripted outcomes by `source_ref` and
/// tracks how many runs are in flight at once.
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: HashMap<String, Script>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source_ref: &str, script: Script) -> Self {
        self.scripts.insert(source_ref.to_string(), script);
        self
    }

    /// Make every successful run take `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, source_ref: &str, _timeout: Duration) -> Result<ProcessOutput, RunnerError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let script = self.scripts.get(source_ref).cloned().unwrap_or(Script::Exit(0));
        let outcome = match script {
            Script::Exit(code) => {
                tokio::time::sleep(self.delay).await;
                Ok(ProcessOutput {
                    exit_code: Some(code),
                    stdout: format!("{source_ref} ran"),
                    stderr: String::new(),
                })
            }
            Script::Hang(d) => {
                tokio::time::sleep(d).await;
                Ok(ProcessOutput {
                    exit_code: Some(0),
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
            Script::SpawnFails => Err(RunnerError::Spawn {
                source_ref: source_ref.to_string(),
                message: "no such file".to_string(),
            }),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}
