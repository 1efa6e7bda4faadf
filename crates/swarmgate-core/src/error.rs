//! Error types for rollout plan validation and configuration.

use thiserror::Error;

/// Reasons a rollout plan is rejected before any traffic is shifted.
///
/// Plan errors are never retried; the caller has to fix the plan.
#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("plan has no stages")]
    NoStages,

    #[error("stage percentages must be strictly increasing: {0:?}")]
    NotIncreasing(Vec<u8>),

    #[error("stage percentage out of range (1-100): {0}")]
    PercentOutOfRange(u8),

    #[error("final stage must be 100, got {0}")]
    IncompletePlan(u8),

    #[error("dwell duration must be positive")]
    NonPositiveDwell,

    #[error("sampling interval must be positive")]
    NonPositiveSamplingInterval,

    #[error("metrics window must be positive")]
    NonPositiveWindow,

    #[error("error-rate threshold must be a fraction in (0, 1]: {0}")]
    InvalidErrorRateThreshold(f64),

    #[error("latency threshold must be positive: {0}")]
    InvalidLatencyThreshold(f64),

    #[error("routing retry attempts must be at least 1")]
    NoRetryAttempts,

    #[error("invalid duration string: {0:?}")]
    InvalidDuration(String),

    #[error("config error: {0}")]
    Config(String),
}
