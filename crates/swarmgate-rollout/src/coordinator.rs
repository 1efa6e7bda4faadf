//! Rollout coordinator — drives the staged rollout state machine.
//!
//! One rollout is one sequential control loop spawned on the runtime.
//! The loop is the only writer of rollout state; callers observe it
//! through a watch channel, so `status()` never blocks and `cancel()`
//! preempts a dwell instead of waiting for the next tick.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use swarmgate_core::{DeploymentTarget, Environment, PlanError, RolloutPlan};
use swarmgate_health::HealthProbe;
use swarmgate_metrics::{Breach, MetricSampler, StageObservations};
use swarmgate_traffic::TrafficShifter;

use crate::rollback::{MigrationRollback, RollbackError, RollbackExecutor};

/// Current phase of a rollout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutPhase {
    /// Rollout not started.
    Pending,
    /// Dwelling on stage N, observing signals.
    StageActive { stage: usize },
    /// Rollback in progress.
    RollingBack,
    /// Rolled back due to failure or cancellation. Terminal.
    RolledBack { reason: RollbackReason },
    /// All stages completed cleanly. Terminal.
    Completed,
}

impl RolloutPhase {
    /// Whether this phase accepts no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RolloutPhase::Completed | RolloutPhase::RolledBack { .. }
        )
    }
}

/// Why a rollout rolled back.
///
/// Distinct codes let operators tell "bad deployment" rollbacks apart
/// from "bad metrics backend" rollbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackReason {
    HealthCheckFailed,
    ErrorRateExceeded,
    LatencyExceeded,
    MetricsUnavailable,
    RoutingFailed,
    Cancelled,
}

impl std::fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RollbackReason::HealthCheckFailed => "health check failed",
            RollbackReason::ErrorRateExceeded => "error rate exceeded",
            RollbackReason::LatencyExceeded => "latency exceeded",
            RollbackReason::MetricsUnavailable => "metrics unavailable",
            RollbackReason::RoutingFailed => "routing update failed",
            RollbackReason::Cancelled => "cancelled by operator",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of a rollout's state, published on every transition and
/// after every gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutStatus {
    pub target: String,
    pub environment: Environment,
    pub current_version: String,
    pub previous_version: String,
    pub phase: RolloutPhase,
    /// Percentage issued for the active stage, if any.
    pub stage_percent: Option<u8>,
    /// Seconds since the rollout started.
    pub elapsed_secs: u64,
    /// Aggregated signals for the active stage.
    pub observations: StageObservations,
    /// Human-readable explanation when rolled back.
    pub detail: Option<String>,
    /// Set when an operator must intervene (partial rollback).
    pub escalate: bool,
}

impl RolloutStatus {
    fn pending(target: &DeploymentTarget) -> Self {
        Self {
            target: target.name.clone(),
            environment: target.environment,
            current_version: target.current_version.clone(),
            previous_version: target.previous_version.clone(),
            phase: RolloutPhase::Pending,
            stage_percent: None,
            elapsed_secs: 0,
            observations: StageObservations::default(),
            detail: None,
            escalate: false,
        }
    }
}

/// Handle to a running rollout.
#[derive(Debug)]
pub struct RolloutHandle {
    status: watch::Receiver<RolloutStatus>,
    cancel: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RolloutHandle {
    /// Current state snapshot. Never blocks on the control loop.
    pub fn status(&self) -> RolloutStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<RolloutStatus> {
        self.status.clone()
    }

    /// Force the rollout into RollingBack. Preempts any in-flight
    /// dwell; a no-op once the rollout is terminal.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Wait for the terminal outcome.
    pub async fn wait(self) -> RolloutStatus {
        let _ = self.join.await;
        self.status.borrow().clone()
    }
}

/// Starts rollouts and wires the collaborators into their control loops.
///
/// Collaborators are shared across rollouts; each rollout owns its own
/// state and loop, so independent targets can roll out concurrently.
pub struct RolloutCoordinator {
    probe: Arc<dyn HealthProbe>,
    sampler: Arc<dyn MetricSampler>,
    shifter: Arc<dyn TrafficShifter>,
    migration: Option<Arc<dyn MigrationRollback>>,
}

impl RolloutCoordinator {
    pub fn new(
        probe: Arc<dyn HealthProbe>,
        sampler: Arc<dyn MetricSampler>,
        shifter: Arc<dyn TrafficShifter>,
    ) -> Self {
        Self {
            probe,
            sampler,
            shifter,
            migration: None,
        }
    }

    pub fn with_migration(mut self, hook: Arc<dyn MigrationRollback>) -> Self {
        self.migration = Some(hook);
        self
    }

    /// Validate the plan and start the rollout's control loop.
    ///
    /// Rejects the plan before any traffic is shifted.
    pub fn start(
        &self,
        plan: RolloutPlan,
        target: DeploymentTarget,
    ) -> Result<RolloutHandle, PlanError> {
        plan.validate()?;

        let (status_tx, status_rx) = watch::channel(RolloutStatus::pending(&target));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let run = RolloutRun {
            plan,
            target,
            probe: Arc::clone(&self.probe),
            sampler: Arc::clone(&self.sampler),
            shifter: Arc::clone(&self.shifter),
            migration: self.migration.clone(),
            status: status_tx,
            cancel: cancel_rx,
            started: Instant::now(),
        };
        let join = tokio::spawn(run.run());

        Ok(RolloutHandle {
            status: status_rx,
            cancel: cancel_tx,
            join,
        })
    }
}

/// How a stage dwell ended.
enum StageVerdict {
    Clean,
    Cancelled,
    Breached(RollbackReason, String),
}

/// Outcome of applying a stage's traffic weight.
enum ApplyOutcome {
    Applied,
    Cancelled,
    Failed(String),
}

/// One rollout's control loop state. Sole writer of the status channel.
struct RolloutRun {
    plan: RolloutPlan,
    target: DeploymentTarget,
    probe: Arc<dyn HealthProbe>,
    sampler: Arc<dyn MetricSampler>,
    shifter: Arc<dyn TrafficShifter>,
    migration: Option<Arc<dyn MigrationRollback>>,
    status: watch::Sender<RolloutStatus>,
    cancel: watch::Receiver<bool>,
    started: Instant,
}

impl RolloutRun {
    async fn run(mut self) {
        info!(
            target = %self.target.name,
            environment = %self.target.environment,
            stages = ?self.plan.stages,
            new_version = %self.target.current_version,
            previous_version = %self.target.previous_version,
            "rollout starting"
        );

        let stages = self.plan.stages.clone();
        for (stage, &percent) in stages.iter().enumerate() {
            if *self.cancel.borrow() {
                self.roll_back(
                    RollbackReason::Cancelled,
                    "cancelled before stage traffic shift".to_string(),
                )
                .await;
                return;
            }

            match self.apply_weight(percent).await {
                ApplyOutcome::Applied => {}
                ApplyOutcome::Cancelled => {
                    self.roll_back(
                        RollbackReason::Cancelled,
                        "cancelled during routing retry".to_string(),
                    )
                    .await;
                    return;
                }
                ApplyOutcome::Failed(detail) => {
                    self.roll_back(RollbackReason::RoutingFailed, detail).await;
                    return;
                }
            }

            self.publish(|s| {
                s.phase = RolloutPhase::StageActive { stage };
                s.stage_percent = Some(percent);
                s.observations = StageObservations::default();
            });
            info!(
                target = %self.target.name,
                stage,
                percent,
                dwell_secs = self.plan.dwell.as_secs(),
                "stage active"
            );

            match self.dwell().await {
                StageVerdict::Clean => {
                    debug!(target = %self.target.name, stage, "stage dwell completed clean");
                }
                StageVerdict::Cancelled => {
                    self.roll_back(
                        RollbackReason::Cancelled,
                        "cancelled mid-dwell".to_string(),
                    )
                    .await;
                    return;
                }
                StageVerdict::Breached(reason, detail) => {
                    self.roll_back(reason, detail).await;
                    return;
                }
            }
        }

        // The candidate is now the known-good baseline for the next
        // rollout.
        let promoted = self.target.current_version.clone();
        self.publish(move |s| {
            s.phase = RolloutPhase::Completed;
            s.previous_version = promoted;
        });
        info!(
            target = %self.target.name,
            version = %self.target.current_version,
            "rollout completed, version promoted"
        );
    }

    /// Apply the stage's traffic weight with bounded retries. Routing
    /// updates are idempotent, so a retry after an ambiguous failure is
    /// safe.
    async fn apply_weight(&mut self, percent: u8) -> ApplyOutcome {
        let attempts = self.plan.routing_retry.max_attempts;
        let mut backoff = self.plan.routing_retry.initial_backoff;

        for attempt in 1..=attempts {
            match self
                .shifter
                .set_weight(&self.target.name, &self.target.current_version, percent)
                .await
            {
                Ok(()) => {
                    debug!(target = %self.target.name, percent, "traffic weight applied");
                    return ApplyOutcome::Applied;
                }
                Err(e) => {
                    warn!(
                        target = %self.target.name,
                        percent,
                        attempt,
                        attempts,
                        error = %e,
                        "routing update failed"
                    );
                    if attempt == attempts {
                        return ApplyOutcome::Failed(format!(
                            "routing update failed after {attempts} attempts: {e}"
                        ));
                    }
                    let hit_cancel = tokio::select! {
                        _ = tokio::time::sleep(backoff) => false,
                        _ = cancelled(&mut self.cancel) => true,
                    };
                    if hit_cancel {
                        return ApplyOutcome::Cancelled;
                    }
                    backoff *= 2;
                }
            }
        }
        unreachable!("retry loop always returns")
    }

    /// Dwell on the active stage, evaluating gates every sampling
    /// interval. Cancellation interrupts the wait itself.
    async fn dwell(&mut self) -> StageVerdict {
        let deadline = Instant::now() + self.plan.dwell;
        let mut observations = StageObservations::default();

        loop {
            let now = Instant::now();
            if now >= deadline {
                return StageVerdict::Clean;
            }
            let tick = self.plan.sampling_interval.min(deadline - now);

            let hit_cancel = tokio::select! {
                _ = tokio::time::sleep(tick) => false,
                _ = cancelled(&mut self.cancel) => true,
            };
            if hit_cancel {
                return StageVerdict::Cancelled;
            }
            if let Some((reason, detail)) = self.evaluate(&mut observations).await {
                return StageVerdict::Breached(reason, detail);
            }
        }
    }

    /// One gate evaluation: probe health, sample metrics, check
    /// thresholds. A sampler error fails closed — no visibility means
    /// no confidence.
    async fn evaluate(
        &mut self,
        observations: &mut StageObservations,
    ) -> Option<(RollbackReason, String)> {
        let report = self.probe.check(&self.target).await;
        if !report.pass {
            let detail = report.detail.unwrap_or_else(|| "probe failed".to_string());
            warn!(target = %self.target.name, %detail, "health gate failed");
            return Some((
                RollbackReason::HealthCheckFailed,
                format!("health check failed: {detail}"),
            ));
        }

        let sample = match self
            .sampler
            .sample(&self.target, self.plan.metrics_window)
            .await
        {
            Ok(sample) => sample,
            Err(e) => {
                warn!(target = %self.target.name, error = %e, "metrics unavailable, failing closed");
                return Some((
                    RollbackReason::MetricsUnavailable,
                    format!("metrics unavailable: {e}"),
                ));
            }
        };

        observations.record(&sample);
        let snapshot = observations.clone();
        self.publish(move |s| {
            s.observations = snapshot;
        });

        if let Some(breach) = observations.exceeds(&self.plan.thresholds) {
            warn!(target = %self.target.name, breach = %breach, "stage threshold breached");
            let reason = match breach {
                Breach::ErrorRate { .. } => RollbackReason::ErrorRateExceeded,
                Breach::Latency { .. } => RollbackReason::LatencyExceeded,
            };
            return Some((reason, breach.to_string()));
        }
        None
    }

    /// Run the rollback path and publish the terminal state.
    async fn roll_back(&mut self, reason: RollbackReason, detail: String) {
        warn!(target = %self.target.name, %reason, %detail, "rolling back");
        self.publish(|s| {
            s.phase = RolloutPhase::RollingBack;
            s.detail = Some(detail.clone());
        });

        let mut executor = RollbackExecutor::new(Arc::clone(&self.shifter));
        if let Some(hook) = &self.migration {
            executor = executor.with_migration(Arc::clone(hook));
        }

        match executor
            .rollback(&self.target, self.plan.schema_affecting)
            .await
        {
            Ok(result) => {
                info!(
                    target = %self.target.name,
                    %reason,
                    schema_restored = ?result.schema_restored,
                    "rollback complete"
                );
                self.publish(|s| {
                    s.phase = RolloutPhase::RolledBack { reason };
                });
            }
            Err(e @ RollbackError::Partial { .. }) => {
                error!(
                    target = %self.target.name,
                    error = %e,
                    "partial rollback, operator intervention required"
                );
                let combined = format!("{detail}; {e}");
                self.publish(move |s| {
                    s.phase = RolloutPhase::RolledBack { reason };
                    s.detail = Some(combined);
                    s.escalate = true;
                });
            }
            Err(e) => {
                error!(
                    target = %self.target.name,
                    error = %e,
                    "traffic restore failed during rollback"
                );
                let combined = format!("{detail}; {e}");
                self.publish(move |s| {
                    s.phase = RolloutPhase::RolledBack { reason };
                    s.detail = Some(combined);
                    s.escalate = true;
                });
            }
        }
    }

    fn publish<F: FnOnce(&mut RolloutStatus)>(&self, f: F) {
        let elapsed = self.started.elapsed().as_secs();
        self.status.send_modify(|s| {
            s.elapsed_secs = elapsed;
            f(s);
        });
    }
}

/// Resolves once the cancel flag is set. Pends forever if the handle
/// was dropped without cancelling.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
