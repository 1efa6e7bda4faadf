//! Per-stage observation aggregation.
//!
//! The coordinator does not retain individual samples. Each stage folds
//! its samples into worst-case figures, which are what the thresholds
//! gate on. A single bad sample anywhere in the dwell is enough to sink
//! the stage.

use serde::{Deserialize, Serialize};

use swarmgate_core::{MetricSample, Thresholds};

/// Aggregated signals for the active rollout stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageObservations {
    /// Number of samples folded in.
    pub samples: u32,
    /// Worst error rate seen this stage (fraction).
    pub max_error_rate: f64,
    /// Worst p95 latency seen this stage (milliseconds).
    pub max_p95_latency_ms: f64,
}

/// A threshold breach detected during a stage dwell.
#[derive(Debug, Clone, PartialEq)]
pub enum Breach {
    ErrorRate { observed: f64, limit: f64 },
    Latency { observed_ms: f64, limit_ms: f64 },
}

impl std::fmt::Display for Breach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Breach::ErrorRate { observed, limit } => write!(
                f,
                "error rate {:.2}% exceeds threshold {:.2}%",
                observed * 100.0,
                limit * 100.0
            ),
            Breach::Latency {
                observed_ms,
                limit_ms,
            } => write!(
                f,
                "p95 latency {observed_ms:.0}ms exceeds threshold {limit_ms:.0}ms"
            ),
        }
    }
}

impl StageObservations {
    /// Fold one sample into the stage aggregate.
    pub fn record(&mut self, sample: &MetricSample) {
        self.samples += 1;
        if sample.error_rate > self.max_error_rate {
            self.max_error_rate = sample.error_rate;
        }
        if sample.p95_latency_ms > self.max_p95_latency_ms {
            self.max_p95_latency_ms = sample.p95_latency_ms;
        }
    }

    /// Check the aggregate against the plan thresholds.
    ///
    /// Error rate takes precedence when both are breached.
    pub fn exceeds(&self, thresholds: &Thresholds) -> Option<Breach> {
        if self.max_error_rate > thresholds.max_error_rate {
            return Some(Breach::ErrorRate {
                observed: self.max_error_rate,
                limit: thresholds.max_error_rate,
            });
        }
        if self.max_p95_latency_ms > thresholds.max_p95_latency_ms {
            return Some(Breach::Latency {
                observed_ms: self.max_p95_latency_ms,
                limit_ms: thresholds.max_p95_latency_ms,
            });
        }
        None
    }
}
