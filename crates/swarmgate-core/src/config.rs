//! swarmgate.toml configuration parser.
//!
//! The config file describes one rollout invocation: the target, the
//! plan, and the endpoints the probe/sampler talk to. Durations are
//! strings like "60s", "500ms", "5m". Unset fields fall back to the
//! plan defaults; the runbook's example numbers are defaults, not
//! contracts.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::PlanError;
use crate::plan::{RetryPolicy, RolloutPlan, Thresholds};
use crate::types::{DeploymentTarget, Environment};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmgateConfig {
    pub target: TargetConfig,
    pub plan: Option<PlanConfig>,
    pub endpoints: EndpointsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub environment: Environment,
    pub current_version: String,
    pub previous_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    pub stages: Option<Vec<u8>>,
    pub dwell: Option<String>,
    pub sampling_interval: Option<String>,
    pub metrics_window: Option<String>,
    /// Fraction, e.g. 0.05 for 5%.
    pub max_error_rate: Option<f64>,
    pub max_p95_latency_ms: Option<f64>,
    pub schema_affecting: Option<bool>,
    pub routing_retry_attempts: Option<u32>,
    pub routing_retry_backoff: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Address (host:port) of the new-version instance to probe.
    pub health_address: String,
    pub health_path: Option<String>,
    pub health_timeout: Option<String>,
    /// Address (host:port) of the metrics backend.
    pub metrics_address: String,
    pub metrics_path: Option<String>,
    pub metrics_timeout: Option<String>,
}

impl SwarmgateConfig {
    pub fn from_file(path: &Path) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PlanError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| PlanError::Config(e.to_string()))
    }

    pub fn deployment_target(&self) -> DeploymentTarget {
        DeploymentTarget {
            name: self.target.name.clone(),
            environment: self.target.environment,
            current_version: self.target.current_version.clone(),
            previous_version: self.target.previous_version.clone(),
        }
    }

    /// Build the runtime plan, applying defaults for unset fields.
    pub fn rollout_plan(&self) -> Result<RolloutPlan, PlanError> {
        let defaults = RolloutPlan::default();
        let Some(cfg) = &self.plan else {
            return Ok(defaults);
        };

        let plan = RolloutPlan {
            stages: cfg.stages.clone().unwrap_or(defaults.stages),
            dwell: opt_duration(&cfg.dwell)?.unwrap_or(defaults.dwell),
            sampling_interval: opt_duration(&cfg.sampling_interval)?
                .unwrap_or(defaults.sampling_interval),
            metrics_window: opt_duration(&cfg.metrics_window)?
                .unwrap_or(defaults.metrics_window),
            thresholds: Thresholds {
                max_error_rate: cfg
                    .max_error_rate
                    .unwrap_or(defaults.thresholds.max_error_rate),
                max_p95_latency_ms: cfg
                    .max_p95_latency_ms
                    .unwrap_or(defaults.thresholds.max_p95_latency_ms),
            },
            schema_affecting: cfg.schema_affecting.unwrap_or(false),
            routing_retry: RetryPolicy {
                max_attempts: cfg
                    .routing_retry_attempts
                    .unwrap_or(defaults.routing_retry.max_attempts),
                initial_backoff: opt_duration(&cfg.routing_retry_backoff)?
                    .unwrap_or(defaults.routing_retry.initial_backoff),
            },
        };
        plan.validate()?;
        Ok(plan)
    }
}

fn opt_duration(s: &Option<String>) -> Result<Option<Duration>, PlanError> {
    match s {
        Some(s) => parse_duration(s).map(Some),
        None => Ok(None),
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Result<Duration, PlanError> {
    let trimmed = s.trim();
    let parsed = if let Some(secs) = trimmed.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = trimmed.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        trimmed.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.ok_or_else(|| PlanError::InvalidDuration(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        [target]
        name = "trend-bot"
        environment = "production"
        current_version = "v2.4.0"
        previous_version = "v2.3.1"

        [plan]
        stages = [10, 50, 100]
        dwell = "60s"
        sampling_interval = "15s"
        max_error_rate = 0.05
        max_p95_latency_ms = 1500.0
        schema_affecting = true

        [endpoints]
        health_address = "10.0.3.21:8080"
        health_path = "/healthz"
        metrics_address = "10.0.3.9:9090"
    "#;

    #[test]
    fn parses_full_config() {
        let config: SwarmgateConfig = toml::from_str(EXAMPLE).unwrap();
        let target = config.deployment_target();
        assert_eq!(target.name, "trend-bot");
        assert_eq!(target.environment, Environment::Production);

        let plan = config.rollout_plan().unwrap();
        assert_eq!(plan.stages, vec![10, 50, 100]);
        assert_eq!(plan.dwell, Duration::from_secs(60));
        assert!(plan.schema_affecting);
        assert_eq!(plan.thresholds.max_error_rate, 0.05);
    }

    #[test]
    fn missing_plan_section_uses_defaults() {
        let config: SwarmgateConfig = toml::from_str(
            r#"
            [target]
            name = "momentum-bot"
            environment = "staging"
            current_version = "v1.1.0"
            previous_version = "v1.0.0"

            [endpoints]
            health_address = "127.0.0.1:8080"
            metrics_address = "127.0.0.1:9090"
            "#,
        )
        .unwrap();

        let plan = config.rollout_plan().unwrap();
        assert_eq!(plan, RolloutPlan::default());
    }

    #[test]
    fn invalid_plan_in_config_rejected() {
        let config: SwarmgateConfig = toml::from_str(
            r#"
            [target]
            name = "trend-bot"
            environment = "production"
            current_version = "v2"
            previous_version = "v1"

            [plan]
            stages = [50, 10, 100]

            [endpoints]
            health_address = "127.0.0.1:8080"
            metrics_address = "127.0.0.1:9090"
            "#,
        )
        .unwrap();

        assert!(matches!(
            config.rollout_plan(),
            Err(PlanError::NotIncreasing(_))
        ));
    }

    #[test]
    fn bad_duration_string_rejected() {
        let config: SwarmgateConfig = toml::from_str(
            r#"
            [target]
            name = "trend-bot"
            environment = "production"
            current_version = "v2"
            previous_version = "v1"

            [plan]
            dwell = "soon"

            [endpoints]
            health_address = "127.0.0.1:8080"
            metrics_address = "127.0.0.1:9090"
            "#,
        )
        .unwrap();

        assert!(matches!(
            config.rollout_plan(),
            Err(PlanError::InvalidDuration(_))
        ));
    }

    #[test]
    fn parse_duration_forms() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
    }
}
