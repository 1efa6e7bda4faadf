//! Rollback execution — restore traffic, optionally revert schema.
//!
//! Traffic restore is the one step that must always happen. Schema
//! rollback only runs when the plan flagged the rollout as
//! schema-affecting, and its failure is never retried automatically:
//! rerunning a half-applied down-migration risks data corruption, so a
//! partial rollback escalates to an operator instead.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use swarmgate_core::DeploymentTarget;
use swarmgate_traffic::{RoutingError, TrafficShifter};

/// External hook that reverts a target's database schema to the
/// previous migration. Opaque to the coordinator; returns whether the
/// down-migration succeeded.
#[async_trait::async_trait]
pub trait MigrationRollback: Send + Sync {
    async fn migration_rollback(&self, target: &DeploymentTarget) -> bool;
}

/// Errors from a rollback attempt.
#[derive(Debug, Error)]
pub enum RollbackError {
    /// Traffic could not be restored to the previous version.
    #[error("traffic restore failed: {0}")]
    Traffic(#[from] RoutingError),

    /// Traffic was restored but the schema rollback did not complete.
    /// Requires operator intervention; never retried automatically.
    #[error("partial rollback for {target}: traffic restored, schema rollback {detail}")]
    Partial { target: String, detail: String },
}

/// Outcome of a successful rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackResult {
    pub traffic_restored: bool,
    /// `None` when the plan did not flag schema changes.
    pub schema_restored: Option<bool>,
}

/// Reverts a deployment to the previous known-good state.
pub struct RollbackExecutor {
    shifter: Arc<dyn TrafficShifter>,
    migration: Option<Arc<dyn MigrationRollback>>,
}

impl RollbackExecutor {
    pub fn new(shifter: Arc<dyn TrafficShifter>) -> Self {
        Self {
            shifter,
            migration: None,
        }
    }

    pub fn with_migration(mut self, hook: Arc<dyn MigrationRollback>) -> Self {
        self.migration = Some(hook);
        self
    }

    /// Restore 100% of traffic to the previous version and, when
    /// `schema_affecting`, run the migration-rollback hook.
    pub async fn rollback(
        &self,
        target: &DeploymentTarget,
        schema_affecting: bool,
    ) -> Result<RollbackResult, RollbackError> {
        // Zero weight to the candidate puts the previous version back
        // at 100%.
        self.shifter
            .set_weight(&target.name, &target.current_version, 0)
            .await?;
        info!(
            target = %target.name,
            previous = %target.previous_version,
            "traffic restored to previous version"
        );

        if !schema_affecting {
            return Ok(RollbackResult {
                traffic_restored: true,
                schema_restored: None,
            });
        }

        match &self.migration {
            Some(hook) => {
                if hook.migration_rollback(target).await {
                    info!(target = %target.name, "schema rollback complete");
                    Ok(RollbackResult {
                        traffic_restored: true,
                        schema_restored: Some(true),
                    })
                } else {
                    warn!(target = %target.name, "schema rollback failed");
                    Err(RollbackError::Partial {
                        target: target.name.clone(),
                        detail: "failed".to_string(),
                    })
                }
            }
            None => {
                warn!(target = %target.name, "schema-affecting rollout has no migration hook");
                Err(RollbackError::Partial {
                    target: target.name.clone(),
                    detail: "hook not configured".to_string(),
                })
            }
        }
    }
}
