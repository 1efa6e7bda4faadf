//! swarmgate-core — shared domain types for the swarmgate rollout coordinator.
//!
//! Holds the data model the other crates operate on: deployment targets,
//! rollout plans with their validation rules, probe/sample observations,
//! and the `swarmgate.toml` configuration parser.
//!
//! # Components
//!
//! - **`types`** — DeploymentTarget, HealthReport, MetricSample
//! - **`plan`** — RolloutPlan, thresholds, retry policy, validation
//! - **`error`** — PlanError
//! - **`config`** — swarmgate.toml parsing with defaults

pub mod config;
pub mod error;
pub mod plan;
pub mod types;

pub use config::SwarmgateConfig;
pub use error::PlanError;
pub use plan::{RetryPolicy, RolloutPlan, Thresholds};
pub use types::{DeploymentTarget, Environment, HealthReport, MetricSample};
