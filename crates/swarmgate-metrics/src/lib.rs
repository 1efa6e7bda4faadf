//! swarmgate-metrics — error-rate and latency sampling for rollout gating.
//!
//! The `MetricSampler` trait yields a windowed `MetricSample` for a
//! target; the HTTP implementation queries an external metrics backend.
//! Unlike health probes, sampling *can* fail — and an unreachable
//! metrics backend is treated as a rollback trigger by the coordinator
//! (no visibility means no confidence).
//!
//! # Components
//!
//! - **`sampler`** — `MetricSampler` trait, `HttpMetricSampler`, `MetricsError`
//! - **`observations`** — per-stage worst-case aggregation and threshold gate

pub mod observations;
pub mod sampler;

pub use observations::{Breach, StageObservations};
pub use sampler::{HttpMetricSampler, MetricSampler, MetricsError};
