//! Vigil - agent liveness & trust certification CLI
//!
//! The `vigil` command drives the liveness ledger for a fleet of agents.
//!
//! ## Commands
//!
//! - `echo` / `intent`: record a liveness pulse or an intent declaration
//! - `verify`: check one agent's pulse against a freshness threshold
//! - `hydrate`: rebuild the canonical registry from a directory or manifest
//! - `audit`: audit every registered agent
//! - `certify` / `drift`: certify state artifacts and detect regressions
//! - `sentinel` / `watch`: silent-failure checks, once or periodically
//! - `purge` / `status`: ghost cleanup and a ledger overview

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, Level};

use vigil_core::certification::CertificationSubject;
use vigil_core::{
    find_ghosts, purge_ghosts, AuditEngine, CertificationEngine, CommandRunner,
    DirArtifactSource, DirectoryEnumerator, DriftDetector, EchoProtocol, IntentTrail,
    ManifestEnumerator, RecordMode, RegistryHydrator, Sentinel, SentinelScope, SharedClock,
    SystemClock, VigilConfig, Watchtower,
};
use vigil_ledger::{keys, read_or_default, LedgerStore};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Agent liveness & trust certification", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML config file (VIGIL_* environment variables still apply on top)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ledger directory (overrides config and VIGIL_LEDGER_DIR)
    #[arg(long, global = true)]
    ledger_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a liveness pulse for an agent
    Echo {
        agent: String,
    },

    /// Check an agent's latest pulse
    Verify {
        agent: String,

        /// Freshness threshold in milliseconds (default from config)
        #[arg(long)]
        threshold_ms: Option<u64>,
    },

    /// Declare an agent's intent
    Intent {
        agent: String,

        /// JSON payload describing the intent
        #[arg(long)]
        payload: Option<String>,
    },

    /// Rebuild the registry from agent sources
    Hydrate {
        /// Directory of agent sources
        #[arg(long, conflicts_with = "manifest", required_unless_present = "manifest")]
        dir: Option<PathBuf>,

        /// TOML manifest listing agents
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// File name pattern for --dir (regex)
        #[arg(long, requires = "dir")]
        pattern: Option<String>,

        /// Copy the current registry to registry_snapshot first
        #[arg(long)]
        snapshot: bool,
    },

    /// Audit every registered agent
    Audit {
        /// Also execute each agent and require a zero exit
        #[arg(long)]
        strict: bool,

        /// Interpreter used to run agent sources in strict mode
        #[arg(long)]
        interpreter: Option<String>,
    },

    /// Certify state artifacts for registered agents and modules
    Certify {
        /// Root directory holding <subject>/<artifact> files
        #[arg(long)]
        artifacts: PathBuf,

        /// Artifacts every registered agent must provide
        #[arg(long, value_delimiter = ',')]
        require: Vec<String>,

        /// Module subject as name=artifact,artifact (repeatable)
        #[arg(long)]
        module: Vec<String>,
    },

    /// Compare the last two certification snapshots
    Drift,

    /// Check for silent failure and record any incident
    Sentinel {
        /// Check one agent instead of the whole fleet
        #[arg(long)]
        agent: Option<String>,

        /// Append to the incident log instead of overwriting the last incident
        #[arg(long)]
        append: bool,

        /// Silence threshold in milliseconds (default from config)
        #[arg(long)]
        threshold_ms: Option<u64>,
    },

    /// Remove echo and intent records of agents no longer registered
    Purge {
        /// Only list ghosts
        #[arg(long)]
        dry_run: bool,
    },

    /// Show a summary of the ledger
    Status,

    /// Run the sentinel and drift checks periodically until Ctrl-C
    Watch,
}

/// Everything a command needs: the ledger, a clock, and the resolved config.
struct Ctx {
    store: Arc<dyn LedgerStore>,
    clock: SharedClock,
    config: VigilConfig,
}

/// Command result printed to stdout. `ok == false` maps to exit code 1.
struct Outcome {
    output: Value,
    ok: bool,
}

impl Outcome {
    fn ok<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self {
            output: serde_json::to_value(value)?,
            ok: true,
        })
    }

    fn with_status<T: Serialize>(value: &T, ok: bool) -> Result<Self> {
        Ok(Self {
            output: serde_json::to_value(value)?,
            ok,
        })
    }
}

fn load_config(path: Option<&Path>, ledger_dir: Option<PathBuf>) -> Result<VigilConfig> {
    let base = match path {
        Some(path) => VigilConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => VigilConfig::default(),
    };
    let mut config = base
        .apply_lookup(|key| std::env::var(key).ok())
        .context("Invalid VIGIL_* environment")?;
    if let Some(dir) = ledger_dir {
        config = config.with_ledger_dir(dir);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    vigil_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref(), cli.ledger_dir)?;
    let store = config
        .open_store()
        .await
        .context("Failed to open Vigil ledger")?;
    let ctx = Ctx {
        store,
        clock: Arc::new(SystemClock),
        config,
    };

    let outcome = match cli.command {
        Commands::Echo { agent } => cmd_echo(&ctx, &agent).await?,
        Commands::Verify {
            agent,
            threshold_ms,
        } => cmd_verify(&ctx, &agent, threshold_ms).await?,
        Commands::Intent { agent, payload } => {
            cmd_intent(&ctx, &agent, payload.as_deref()).await?
        }
        Commands::Hydrate {
            dir,
            manifest,
            pattern,
            snapshot,
        } => {
            cmd_hydrate(
                &ctx,
                dir.as_deref(),
                manifest.as_deref(),
                pattern.as_deref(),
                snapshot,
            )
            .await?
        }
        Commands::Audit {
            strict,
            interpreter,
        } => cmd_audit(&ctx, strict, interpreter).await?,
        Commands::Certify {
            artifacts,
            require,
            module,
        } => cmd_certify(&ctx, &artifacts, &require, &module).await?,
        Commands::Drift => cmd_drift(&ctx).await?,
        Commands::Sentinel {
            agent,
            append,
            threshold_ms,
        } => cmd_sentinel(&ctx, agent, append, threshold_ms).await?,
        Commands::Purge { dry_run } => cmd_purge(&ctx, dry_run).await?,
        Commands::Status => cmd_status(&ctx).await?,
        Commands::Watch => cmd_watch(&ctx).await?,
    };

    println!("{}", serde_json::to_string_pretty(&outcome.output)?);
    Ok(if outcome.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_echo(ctx: &Ctx, agent: &str) -> Result<Outcome> {
    let record = EchoProtocol::new(ctx.store.clone(), ctx.clock.clone())
        .commit_echo(agent)
        .await
        .with_context(|| format!("Failed to commit echo for {agent}"))?;
    Outcome::ok(&record)
}

async fn cmd_verify(ctx: &Ctx, agent: &str, threshold_ms: Option<u64>) -> Result<Outcome> {
    let threshold = threshold_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| ctx.config.echo_threshold());
    let status = EchoProtocol::new(ctx.store.clone(), ctx.clock.clone())
        .verify_echo(agent, threshold)
        .await?;
    Outcome::with_status(
        &json!({ "agent": agent, "status": status }),
        status.is_fresh(),
    )
}

async fn cmd_intent(ctx: &Ctx, agent: &str, payload: Option<&str>) -> Result<Outcome> {
    let payload = payload
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--payload must be valid JSON")?;
    let record = IntentTrail::new(ctx.store.clone(), ctx.clock.clone())
        .declare_intent(agent, payload)
        .await?;
    Outcome::ok(&record)
}

async fn cmd_hydrate(
    ctx: &Ctx,
    dir: Option<&Path>,
    manifest: Option<&Path>,
    pattern: Option<&str>,
    snapshot: bool,
) -> Result<Outcome> {
    let hydrator = RegistryHydrator::new(ctx.store.clone(), ctx.clock.clone());
    if snapshot {
        hydrator.snapshot_registry().await?;
    }

    let registry = match (dir, manifest) {
        (Some(dir), _) => {
            let enumerator = match pattern {
                Some(p) => DirectoryEnumerator::with_pattern(dir, p)?,
                None => DirectoryEnumerator::new(dir)?,
            };
            hydrator.hydrate(&enumerator).await
        }
        (None, Some(path)) => hydrator.hydrate(&ManifestEnumerator::new(path)).await,
        (None, None) => bail!("hydrate needs --dir or --manifest"),
    }
    .context("Hydration failed; previous registry kept")?;

    info!(agents = registry.len(), "registry hydrated");
    Outcome::ok(&registry)
}

async fn cmd_audit(ctx: &Ctx, strict: bool, interpreter: Option<String>) -> Result<Outcome> {
    let audit_config = ctx.config.audit_config();
    let strict = strict || audit_config.strict;
    let mut engine = AuditEngine::new(
        ctx.store.clone(),
        ctx.clock.clone(),
        audit_config.with_strict(strict),
    );

    if strict {
        let runner = match interpreter.or_else(|| ctx.config.agent_interpreter.clone()) {
            Some(interp) => CommandRunner::with_interpreter(interp),
            None => CommandRunner::direct(),
        };
        engine = engine.with_runner(Arc::new(runner));
    }

    let run = engine.run().await.context("Audit failed")?;
    let all_passed = run.failed_count() == 0;
    Outcome::with_status(&run, all_passed)
}

/// Parse `name=a,b` into a module subject.
fn parse_module(spec: &str) -> Result<CertificationSubject> {
    let Some((name, artifacts)) = spec.split_once('=') else {
        bail!("--module expects name=artifact[,artifact], got {spec:?}");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("--module name is empty in {spec:?}");
    }
    let required = artifacts
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();
    Ok(CertificationSubject::module(name, required))
}

async fn cmd_certify(
    ctx: &Ctx,
    artifacts: &Path,
    require: &[String],
    modules: &[String],
) -> Result<Outcome> {
    let registry = RegistryHydrator::new(ctx.store.clone(), ctx.clock.clone())
        .load_registry()
        .await?;

    let mut subjects: Vec<CertificationSubject> = registry
        .agents
        .iter()
        .map(|a| CertificationSubject::agent(a.name.clone(), require.to_vec()))
        .collect();
    for spec in modules {
        subjects.push(parse_module(spec)?);
    }
    if subjects.is_empty() {
        bail!("nothing to certify: registry is empty and no --module given");
    }

    let engine = CertificationEngine::new(
        ctx.store.clone(),
        ctx.clock.clone(),
        Arc::new(DirArtifactSource::new(artifacts)),
    );
    let snapshot = engine.certify_all(&subjects).await?;
    let all_certified = snapshot.results.values().all(|r| r.certified);
    Outcome::with_status(&snapshot, all_certified)
}

async fn cmd_drift(ctx: &Ctx) -> Result<Outcome> {
    let report = DriftDetector::new(ctx.store.clone(), ctx.clock.clone())
        .check()
        .await?;
    Outcome::with_status(&report, !report.has_regressions())
}

async fn cmd_sentinel(
    ctx: &Ctx,
    agent: Option<String>,
    append: bool,
    threshold_ms: Option<u64>,
) -> Result<Outcome> {
    let threshold = threshold_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| ctx.config.sentinel_threshold());
    let scope = match agent {
        Some(name) => SentinelScope::Agent(name),
        None => SentinelScope::Fleet,
    };
    let mode = if append {
        RecordMode::Append
    } else {
        RecordMode::Overwrite
    };

    let sentinel = Sentinel::new(ctx.store.clone(), ctx.clock.clone());
    let incident = sentinel.check(threshold, &scope).await?;
    if let Some(incident) = &incident {
        sentinel.record(incident, mode).await?;
    }
    Outcome::with_status(&json!({ "incident": incident }), incident.is_none())
}

async fn cmd_purge(ctx: &Ctx, dry_run: bool) -> Result<Outcome> {
    if dry_run {
        let ghosts = find_ghosts(&*ctx.store).await?;
        return Outcome::ok(&json!({ "ghosts": ghosts }));
    }
    let report = purge_ghosts(ctx.store.clone()).await?;
    Outcome::ok(&report)
}

async fn cmd_status(ctx: &Ctx) -> Result<Outcome> {
    let registry = RegistryHydrator::new(ctx.store.clone(), ctx.clock.clone())
        .load_registry()
        .await?;
    let echo = EchoProtocol::new(ctx.store.clone(), ctx.clock.clone());
    let pulses = echo.all_echoes().await?;
    let latest = echo.latest_echo().await?;
    let ghosts = find_ghosts(&*ctx.store).await?;

    let audit: vigil_core::AuditRun = read_or_default(&*ctx.store, keys::AUDIT_RESULTS).await?;
    let certification: vigil_core::CertificationSnapshot =
        read_or_default(&*ctx.store, keys::CERTIFICATION_CURRENT).await?;
    let drift: vigil_core::DriftReport = read_or_default(&*ctx.store, keys::DRIFT_REPORT).await?;
    let incident: Option<vigil_core::SentinelIncident> =
        read_or_default(&*ctx.store, keys::SENTINEL_INCIDENT).await?;

    let audit_summary = if audit.run_id.is_empty() {
        Value::Null
    } else {
        json!({
            "run_id": audit.run_id,
            "finished_at": audit.finished_at,
            "strict": audit.strict,
            "passed": audit.passed_count(),
            "failed": audit.failed_count(),
        })
    };

    Outcome::ok(&json!({
        "version": vigil_core::VERSION,
        "backend": ctx.config.backend,
        "registry": {
            "hydrated": registry.is_hydrated(),
            "generated_at": registry.generated_at,
            "agents": registry.len(),
        },
        "echoes": pulses.len(),
        "latest_echo": latest,
        "ghosts": ghosts,
        "last_audit": audit_summary,
        "certified": certification.results.values().filter(|r| r.certified).count(),
        "certification_subjects": certification.results.len(),
        "regressions": drift.regressions,
        "last_incident": incident,
    }))
}

async fn cmd_watch(ctx: &Ctx) -> Result<Outcome> {
    let watch_config = ctx.config.watch_config();
    info!(
        sentinel_interval_secs = watch_config.sentinel_interval.as_secs(),
        drift_interval_secs = watch_config.drift_interval.as_secs(),
        "vigil watch started"
    );
    let watchtower = Watchtower::start(ctx.store.clone(), ctx.clock.clone(), watch_config);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("shutting down watch loops");
    watchtower.shutdown().await;

    Outcome::ok(&json!({ "stopped": true }))
}
