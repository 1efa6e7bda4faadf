//! Domain types shared across the swarmgate crates.
//!
//! These types describe what is being rolled out and what the external
//! collaborators report back while a rollout is in flight. All types are
//! serializable to/from JSON for status endpoints and logs.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Which environment a deployment target lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Staging,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// One deployable unit of the swarm (a bot service, the engine, etc).
///
/// `current_version` is the candidate being rolled out; `previous_version`
/// is the known-good version traffic falls back to on rollback. Version
/// fields are only touched by the rollout coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    pub name: String,
    pub environment: Environment,
    pub current_version: String,
    pub previous_version: String,
}

impl DeploymentTarget {
    pub fn new(
        name: &str,
        environment: Environment,
        current_version: &str,
        previous_version: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            environment,
            current_version: current_version.to_string(),
            previous_version: previous_version.to_string(),
        }
    }
}

/// Point-in-time result of a liveness/readiness probe.
///
/// Probe failures (timeout, refused connection, non-2xx) fold into
/// `pass = false` with a diagnostic detail, so the coordinator's gate
/// logic stays uniform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub target: String,
    pub epoch: u64,
    pub pass: bool,
    pub detail: Option<String>,
}

impl HealthReport {
    /// A passing report for a target, stamped now.
    pub fn pass(target: &str) -> Self {
        Self {
            target: target.to_string(),
            epoch: epoch_secs(),
            pass: true,
            detail: None,
        }
    }

    /// A failing report with a diagnostic detail, stamped now.
    pub fn fail(target: &str, detail: &str) -> Self {
        Self {
            target: target.to_string(),
            epoch: epoch_secs(),
            pass: false,
            detail: Some(detail.to_string()),
        }
    }
}

/// Point-in-time error-rate and latency reading for a target.
///
/// `error_rate` is a fraction (0.0-1.0) over the sampler's trailing
/// window; `p95_latency_ms` is the window's 95th-percentile latency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub target: String,
    pub epoch: u64,
    pub error_rate: f64,
    pub p95_latency_ms: f64,
}

impl MetricSample {
    pub fn new(target: &str, error_rate: f64, p95_latency_ms: f64) -> Self {
        Self {
            target: target.to_string(),
            epoch: epoch_secs(),
            error_rate,
            p95_latency_ms,
        }
    }
}

/// Seconds since the Unix epoch.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
