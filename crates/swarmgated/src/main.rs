//! swarmgated — drives one staged rollout from a config file.
//!
//! Wires the HTTP health probe and metric sampler to the rollout
//! coordinator, streams state transitions to the log, and exits
//! nonzero when the rollout ends in RolledBack.
//!
//! # Usage
//!
//! ```text
//! swarmgated run --config swarmgate.toml
//! swarmgated validate --config swarmgate.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use swarmgate_core::SwarmgateConfig;
use swarmgate_core::config::parse_duration;
use swarmgate_health::HttpHealthProbe;
use swarmgate_metrics::HttpMetricSampler;
use swarmgate_rollout::{RolloutCoordinator, RolloutPhase};
use swarmgate_traffic::WeightedRouter;

#[derive(Parser)]
#[command(name = "swarmgated", about = "Swarmgate rollout daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a rollout to completion or rollback.
    Run {
        /// Path to the swarmgate.toml config.
        #[arg(long, default_value = "swarmgate.toml")]
        config: PathBuf,
    },
    /// Validate a config without touching routing state.
    Validate {
        /// Path to the swarmgate.toml config.
        #[arg(long, default_value = "swarmgate.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,swarmgate=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { config } => run(config).await,
        Command::Validate { config } => validate(config),
    }
}

fn validate(path: PathBuf) -> anyhow::Result<()> {
    let config = SwarmgateConfig::from_file(&path)?;
    let plan = config.rollout_plan()?;
    let target = config.deployment_target();
    info!(
        target = %target.name,
        stages = ?plan.stages,
        dwell_secs = plan.dwell.as_secs(),
        schema_affecting = plan.schema_affecting,
        "plan is valid"
    );
    Ok(())
}

async fn run(path: PathBuf) -> anyhow::Result<()> {
    let config = SwarmgateConfig::from_file(&path)?;
    let plan = config.rollout_plan()?;
    let target = config.deployment_target();

    let endpoints = &config.endpoints;
    let health_path = endpoints.health_path.as_deref().unwrap_or("/healthz");
    let mut probe = HttpHealthProbe::new(&endpoints.health_address, health_path);
    if let Some(timeout) = &endpoints.health_timeout {
        probe = probe.with_timeout(parse_duration(timeout)?);
    }

    let metrics_path = endpoints
        .metrics_path
        .as_deref()
        .unwrap_or("/api/v1/swarm/metrics");
    let mut sampler = HttpMetricSampler::new(&endpoints.metrics_address, metrics_path);
    if let Some(timeout) = &endpoints.metrics_timeout {
        sampler = sampler.with_timeout(parse_duration(timeout)?);
    }

    let router = WeightedRouter::new();
    let coordinator = RolloutCoordinator::new(
        Arc::new(probe),
        Arc::new(sampler),
        Arc::new(router),
    );

    info!(target = %target.name, environment = %target.environment, "starting rollout");
    let handle = coordinator.start(plan, target)?;
    let mut updates = handle.subscribe();

    loop {
        let status = updates.borrow_and_update().clone();
        info!(
            phase = %serde_json::to_string(&status.phase)?,
            stage_percent = status.stage_percent,
            samples = status.observations.samples,
            max_error_rate = status.observations.max_error_rate,
            "rollout status"
        );
        if status.phase.is_terminal() {
            break;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupt received, cancelling rollout");
                handle.cancel();
                // Loop again; the terminal status arrives via the channel.
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }

    let status = handle.wait().await;
    match &status.phase {
        RolloutPhase::Completed => {
            info!(target = %status.target, "rollout completed");
            Ok(())
        }
        RolloutPhase::RolledBack { reason } => {
            let detail = status.detail.as_deref().unwrap_or("no detail");
            if status.escalate {
                warn!(%reason, detail, "rolled back; OPERATOR INTERVENTION REQUIRED");
            } else {
                warn!(%reason, detail, "rolled back");
            }
            anyhow::bail!("rollout rolled back: {reason} ({detail})")
        }
        other => anyhow::bail!("rollout ended in unexpected phase: {other:?}"),
    }
}
