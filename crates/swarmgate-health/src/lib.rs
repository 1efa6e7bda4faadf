//! swarmgate-health — liveness/readiness probing for rollout gating.
//!
//! Exposes the `HealthProbe` trait consumed by the rollout coordinator
//! and an HTTP implementation. Probes never error to the caller: every
//! failure mode (timeout, refused connection, non-2xx) folds into a
//! failing `HealthReport` so the coordinator's gate logic stays uniform.

pub mod probe;

pub use probe::{HealthProbe, HttpHealthProbe};
