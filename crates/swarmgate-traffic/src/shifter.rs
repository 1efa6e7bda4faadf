//! Traffic shifter trait and the in-memory weighted router.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::info;

/// Errors applying a routing update.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("invalid weight percent (0-100): {0}")]
    InvalidPercent(u8),

    #[error("routing update rejected: {0}")]
    Rejected(String),
}

/// Changes the proportion of a target's production traffic routed to a
/// named version. Safe for concurrent use across independent rollouts.
#[async_trait::async_trait]
pub trait TrafficShifter: Send + Sync {
    /// Route `percent` of `target`'s traffic to `version_tag`; the
    /// remainder stays on the previously serving version. Idempotent.
    async fn set_weight(
        &self,
        target: &str,
        version_tag: &str,
        percent: u8,
    ) -> Result<(), RoutingError>;
}

/// Current traffic split for one target.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TrafficSplit {
    /// Version receiving the weighted share.
    pub version_tag: String,
    /// Share of traffic (0-100) routed to `version_tag`.
    pub percent: u8,
}

/// In-memory weighted routing table.
///
/// The table is what fronting proxies sync their upstream weights from.
/// Each update replaces the target's split in one write, so a reader
/// holding the lock sees either the old or the new split, never a blend.
#[derive(Clone, Default)]
pub struct WeightedRouter {
    splits: Arc<RwLock<HashMap<String, TrafficSplit>>>,
}

impl WeightedRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current split for a target, if one has been set.
    pub fn split(&self, target: &str) -> Option<TrafficSplit> {
        let splits = self.splits.read().expect("splits lock");
        splits.get(target).cloned()
    }

    /// List targets with an active split.
    pub fn targets(&self) -> Vec<String> {
        let splits = self.splits.read().expect("splits lock");
        splits.keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl TrafficShifter for WeightedRouter {
    async fn set_weight(
        &self,
        target: &str,
        version_tag: &str,
        percent: u8,
    ) -> Result<(), RoutingError> {
        if percent > 100 {
            return Err(RoutingError::InvalidPercent(percent));
        }

        let mut splits = self.splits.write().expect("splits lock");
        let entry = TrafficSplit {
            version_tag: version_tag.to_string(),
            percent,
        };
        if splits.get(target) == Some(&entry) {
            // Replay of the identical instruction: nothing to apply.
            return Ok(());
        }
        splits.insert(target.to_string(), entry);
        info!(%target, version = version_tag, percent, "traffic weight updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_read_split() {
        let router = WeightedRouter::new();
        router.set_weight("trend-bot", "v2", 10).await.unwrap();

        let split = router.split("trend-bot").unwrap();
        assert_eq!(split.version_tag, "v2");
        assert_eq!(split.percent, 10);
    }

    #[tokio::test]
    async fn repeated_identical_update_is_idempotent() {
        let router = WeightedRouter::new();
        router.set_weight("trend-bot", "v2", 50).await.unwrap();
        let before = router.split("trend-bot").unwrap();

        router.set_weight("trend-bot", "v2", 50).await.unwrap();
        assert_eq!(router.split("trend-bot").unwrap(), before);
    }

    #[tokio::test]
    async fn over_100_percent_rejected() {
        let router = WeightedRouter::new();
        let err = router.set_weight("trend-bot", "v2", 101).await.unwrap_err();
        assert!(matches!(err, RoutingError::InvalidPercent(101)));
        assert!(router.split("trend-bot").is_none());
    }

    #[tokio::test]
    async fn zero_percent_reverts_to_previous_version() {
        let router = WeightedRouter::new();
        router.set_weight("trend-bot", "v2", 75).await.unwrap();
        router.set_weight("trend-bot", "v2", 0).await.unwrap();

        let split = router.split("trend-bot").unwrap();
        assert_eq!(split.percent, 0);
    }

    #[tokio::test]
    async fn targets_are_independent() {
        let router = WeightedRouter::new();
        router.set_weight("trend-bot", "v2", 25).await.unwrap();
        router.set_weight("momentum-bot", "v5", 100).await.unwrap();

        assert_eq!(router.split("trend-bot").unwrap().percent, 25);
        assert_eq!(router.split("momentum-bot").unwrap().percent, 100);

        let mut targets = router.targets();
        targets.sort();
        assert_eq!(targets, vec!["momentum-bot", "trend-bot"]);
    }

    #[tokio::test]
    async fn concurrent_updates_to_distinct_targets() {
        let router = WeightedRouter::new();
        let mut handles = Vec::new();
        for i in 0..8u8 {
            let router = router.clone();
            handles.push(tokio::spawn(async move {
                let target = format!("bot-{i}");
                for percent in [10, 50, 100] {
                    router.set_weight(&target, "v2", percent).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        for i in 0..8u8 {
            assert_eq!(router.split(&format!("bot-{i}")).unwrap().percent, 100);
        }
    }
}
