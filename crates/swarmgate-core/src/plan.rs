//! Rollout plans — staged traffic percentages, dwell, thresholds.
//!
//! A `RolloutPlan` is immutable once a rollout starts. Validation happens
//! up front, before the first traffic shift, so a bad plan never touches
//! routing state.

use std::time::Duration;

use crate::error::PlanError;

/// Failure thresholds evaluated during each stage's dwell.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// Maximum tolerated error rate as a fraction (0.0-1.0).
    pub max_error_rate: f64,
    /// Maximum tolerated p95 latency in milliseconds.
    pub max_p95_latency_ms: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_error_rate: 0.05,
            max_p95_latency_ms: 1500.0,
        }
    }
}

/// Bounded retry policy for traffic-shift calls.
///
/// Routing updates are retried with exponential backoff before the
/// rollout gives up and rolls back.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles per attempt.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
        }
    }
}

/// A staged rollout plan: which traffic percentages to walk through,
/// how long to observe each stage, and when to give up.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutPlan {
    /// Ordered traffic percentages for the new version. Must be strictly
    /// increasing and end at 100.
    pub stages: Vec<u8>,
    /// How long each stage dwells, observing signals, before advancing.
    pub dwell: Duration,
    /// How often health and metrics are evaluated during a dwell.
    pub sampling_interval: Duration,
    /// Trailing window the metric sampler aggregates over.
    pub metrics_window: Duration,
    /// Error-rate and latency gates.
    pub thresholds: Thresholds,
    /// Whether this rollout ships a schema migration. Controls whether
    /// rollback also runs the migration-rollback hook.
    pub schema_affecting: bool,
    /// Retry policy for routing updates.
    pub routing_retry: RetryPolicy,
}

impl Default for RolloutPlan {
    fn default() -> Self {
        Self {
            stages: vec![10, 25, 50, 75, 100],
            dwell: Duration::from_secs(60),
            sampling_interval: Duration::from_secs(15),
            metrics_window: Duration::from_secs(60),
            thresholds: Thresholds::default(),
            schema_affecting: false,
            routing_retry: RetryPolicy::default(),
        }
    }
}

impl RolloutPlan {
    /// Validate the plan. Called by the coordinator before any traffic
    /// shift is issued.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.stages.is_empty() {
            return Err(PlanError::NoStages);
        }
        for &percent in &self.stages {
            if percent == 0 || percent > 100 {
                return Err(PlanError::PercentOutOfRange(percent));
            }
        }
        for window in self.stages.windows(2) {
            if window[1] <= window[0] {
                return Err(PlanError::NotIncreasing(self.stages.clone()));
            }
        }
        let last = *self.stages.last().unwrap_or(&0);
        if last != 100 {
            return Err(PlanError::IncompletePlan(last));
        }
        if self.dwell.is_zero() {
            return Err(PlanError::NonPositiveDwell);
        }
        if self.sampling_interval.is_zero() {
            return Err(PlanError::NonPositiveSamplingInterval);
        }
        if self.metrics_window.is_zero() {
            return Err(PlanError::NonPositiveWindow);
        }
        if self.thresholds.max_error_rate <= 0.0 || self.thresholds.max_error_rate > 1.0 {
            return Err(PlanError::InvalidErrorRateThreshold(
                self.thresholds.max_error_rate,
            ));
        }
        if self.thresholds.max_p95_latency_ms <= 0.0 {
            return Err(PlanError::InvalidLatencyThreshold(
                self.thresholds.max_p95_latency_ms,
            ));
        }
        if self.routing_retry.max_attempts == 0 {
            return Err(PlanError::NoRetryAttempts);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_plan() -> RolloutPlan {
        RolloutPlan {
            stages: vec![10, 50, 100],
            ..Default::default()
        }
    }

    #[test]
    fn default_plan_is_valid() {
        assert!(RolloutPlan::default().validate().is_ok());
    }

    #[test]
    fn canary_style_plan_is_valid() {
        assert!(valid_plan().validate().is_ok());
    }

    #[test]
    fn single_full_stage_is_valid() {
        let plan = RolloutPlan {
            stages: vec![100],
            ..Default::default()
        };
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn empty_stages_rejected() {
        let plan = RolloutPlan {
            stages: vec![],
            ..Default::default()
        };
        assert_eq!(plan.validate(), Err(PlanError::NoStages));
    }

    #[test]
    fn non_monotonic_stages_rejected() {
        let plan = RolloutPlan {
            stages: vec![50, 10, 100],
            ..Default::default()
        };
        assert_eq!(
            plan.validate(),
            Err(PlanError::NotIncreasing(vec![50, 10, 100]))
        );
    }

    #[test]
    fn repeated_stage_rejected() {
        let plan = RolloutPlan {
            stages: vec![10, 10, 100],
            ..Default::default()
        };
        assert!(matches!(
            plan.validate(),
            Err(PlanError::NotIncreasing(_))
        ));
    }

    #[test]
    fn plan_not_ending_at_full_rejected() {
        let plan = RolloutPlan {
            stages: vec![10, 50],
            ..Default::default()
        };
        assert_eq!(plan.validate(), Err(PlanError::IncompletePlan(50)));
    }

    #[test]
    fn zero_percent_stage_rejected() {
        let plan = RolloutPlan {
            stages: vec![0, 100],
            ..Default::default()
        };
        assert_eq!(plan.validate(), Err(PlanError::PercentOutOfRange(0)));
    }

    #[test]
    fn zero_dwell_rejected() {
        let plan = RolloutPlan {
            dwell: Duration::ZERO,
            ..valid_plan()
        };
        assert_eq!(plan.validate(), Err(PlanError::NonPositiveDwell));
    }

    #[test]
    fn zero_sampling_interval_rejected() {
        let plan = RolloutPlan {
            sampling_interval: Duration::ZERO,
            ..valid_plan()
        };
        assert_eq!(
            plan.validate(),
            Err(PlanError::NonPositiveSamplingInterval)
        );
    }

    #[test]
    fn bad_error_rate_threshold_rejected() {
        let plan = RolloutPlan {
            thresholds: Thresholds {
                max_error_rate: 5.0, // Percent, not fraction — reject.
                ..Default::default()
            },
            ..valid_plan()
        };
        assert!(matches!(
            plan.validate(),
            Err(PlanError::InvalidErrorRateThreshold(_))
        ));
    }

    #[test]
    fn zero_retry_attempts_rejected() {
        let plan = RolloutPlan {
            routing_retry: RetryPolicy {
                max_attempts: 0,
                initial_backoff: Duration::from_secs(1),
            },
            ..valid_plan()
        };
        assert_eq!(plan.validate(), Err(PlanError::NoRetryAttempts));
    }
}
