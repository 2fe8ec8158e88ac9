//! Rollout strategies: load-balancer-aware or plain.

use std::fmt;

use crate::directory::RolloutTarget;

/// How targets are drained and named during an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutStrategy {
    /// Drain each target from its load-balancer pool before updating it.
    /// Targets are named `server::instance::member`.
    LoadBalancerAware,
    /// Update in place. Targets are named `server::instance`.
    #[default]
    Plain,
}

impl RolloutStrategy {
    /// Load-balancer-aware as soon as one target has an active pool member.
    pub fn for_targets(targets: &[RolloutTarget]) -> Self {
        if targets.iter().any(|t| t.member.is_some()) {
            RolloutStrategy::LoadBalancerAware
        } else {
            RolloutStrategy::Plain
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RolloutStrategy::LoadBalancerAware => "load_balancer_aware",
            RolloutStrategy::Plain => "plain",
        }
    }
}

impl fmt::Display for RolloutStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
