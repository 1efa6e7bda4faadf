//! swarmgate-traffic — weighted traffic routing for staged rollouts.
//!
//! The `TrafficShifter` trait abstracts "route N% of a target's traffic
//! to this version". Updates must be idempotent (replaying the same
//! instruction neither errors nor double-applies) and atomic from the
//! reader's perspective (no mid-update split is ever observable).

pub mod shifter;

pub use shifter::{RoutingError, TrafficShifter, TrafficSplit, WeightedRouter};
