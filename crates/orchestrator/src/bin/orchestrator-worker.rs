//! orchestrator-worker: runs the orchestrator against live system metrics.
//!
//! Loads an optional TOML config (env overrides apply either way), seeds a
//! small demo graph, submits a handful of tasks and logs system status until
//! Ctrl-C.

use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use pathweave_compute::ProjectKind;
use pathweave_core::config::load_env_file;
use pathweave_core::{Config, Entity, EntityKind, RelationshipKind};
use pathweave_orchestrator::{Orchestrator, Priority, TaskPayload};

// ── CLI ─────────────────────────────────────────────────────────────

/// Resource-aware workflow orchestrator worker.
#[derive(Parser, Debug)]
#[command(name = "orchestrator-worker", version, about)]
struct Cli {
    /// Path to a pathweave.toml config file.
    #[arg(long, env = "PATHWEAVE_CONFIG")]
    config: Option<String>,

    /// Tenant the demo graph is loaded into.
    #[arg(long, env = "PATHWEAVE_DEMO_TENANT", default_value = "demo")]
    tenant: String,

    /// Skip loading the demo graph and tasks.
    #[arg(long)]
    no_demo: bool,

    /// Status log interval in seconds.
    #[arg(long, env = "PATHWEAVE_STATUS_INTERVAL", default_value_t = 15)]
    status_interval: u64,
}

// ── Demo ────────────────────────────────────────────────────────────

fn load_demo(orchestrator: &Orchestrator, tenant: &str) -> anyhow::Result<()> {
    let entities = [
        Entity::new("alice", EntityKind::Person),
        Entity::new("bob", EntityKind::Person),
        Entity::new("carol", EntityKind::Person),
        Entity::new("riverbend", EntityKind::Organization),
        Entity::new("acme-foundation", EntityKind::Sponsor)
            .with_attribute("tier", serde_json::json!("gold")),
    ];
    for entity in &entities {
        orchestrator.add_entity(tenant, entity)?;
    }

    let links = [
        ("alice", "bob", RelationshipKind::Colleague, 0.9),
        ("bob", "riverbend", RelationshipKind::Employment, 0.8),
        ("carol", "riverbend", RelationshipKind::Advisory, 0.6),
        ("riverbend", "acme-foundation", RelationshipKind::Funding, 0.7),
        ("alice", "carol", RelationshipKind::Referral, 0.5),
    ];
    for (source, target, kind, strength) in links {
        orchestrator.add_relationship(tenant, source, target, kind, strength, None)?;
    }

    let refresh = orchestrator.submit_task(tenant, TaskPayload::LandmarkRefresh, Priority::Low, &[])?;
    orchestrator.submit_task(
        tenant,
        TaskPayload::PathDiscovery {
            source: "alice".into(),
            target: "acme-foundation".into(),
            max_degree: None,
            k: Some(3),
        },
        Priority::High,
        &[refresh],
    )?;
    orchestrator.submit_task(
        tenant,
        TaskPayload::Metrics {
            entity: "acme-foundation".into(),
            signals: None,
        },
        Priority::Medium,
        &[],
    )?;
    orchestrator.submit_task(
        tenant,
        TaskPayload::Timeline {
            deadline: Utc::now() + chrono::Duration::days(75),
            project_kind: ProjectKind::Foundation,
        },
        Priority::Medium,
        &[],
    )?;

    info!(tenant, entities = entities.len(), "demo graph loaded");
    Ok(())
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Some(path) = load_env_file() {
        info!(path = %path.display(), "loaded environment file");
    }
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.log_summary();

    let orchestrator = Orchestrator::builder(config).build()?;
    orchestrator.start();

    if !cli.no_demo {
        if let Err(e) = load_demo(&orchestrator, &cli.tenant) {
            warn!(error = %e, "demo load failed");
        }
    }

    info!("orchestrator-worker running");
    let mut ticker = tokio::time::interval(Duration::from_secs(cli.status_interval.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let status = orchestrator.get_system_status();
                info!(
                    level = %status.level,
                    queue_depth = status.queue_depth,
                    running = status.running_count,
                    cpu = ?status.resource_snapshot.map(|s| s.cpu_percent),
                    memory = ?status.resource_snapshot.map(|s| s.memory_percent),
                    "status"
                );
            }
        }
    }

    orchestrator.shutdown().await;
    let report = orchestrator.get_compliance_report();
    info!(
        samples = report.samples_observed,
        violations = report.violations.total(),
        drained = report.drained_tasks,
        "orchestrator-worker exited cleanly"
    );
    Ok(())
}
