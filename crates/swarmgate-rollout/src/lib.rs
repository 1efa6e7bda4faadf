//! swarmgate-rollout — the staged rollout state machine.
//!
//! Drives one rollout from start to a terminal outcome: shift a traffic
//! percentage to the new version, dwell while probing health and
//! sampling metrics, advance on a clean dwell, roll back on any breach.
//! Rollback restores 100% of traffic to the previous version and, for
//! schema-affecting rollouts, invokes the migration-rollback hook.
//!
//! # Components
//!
//! - **`coordinator`** — RolloutCoordinator, RolloutHandle, the control loop
//! - **`rollback`** — RollbackExecutor, MigrationRollback hook
//!
//! # State machine
//!
//! ```text
//! Pending → StageActive(0) → … → StageActive(n) → Completed
//!               │ breach / cancel / routing exhausted
//!               ▼
//!          RollingBack → RolledBack (terminal)
//! ```

pub mod coordinator;
pub mod rollback;

pub use coordinator::{
    RollbackReason, RolloutCoordinator, RolloutHandle, RolloutPhase, RolloutStatus,
};
pub use rollback::{MigrationRollback, RollbackError, RollbackExecutor, RollbackResult};
