//! Isolation strategies for sandbox containers.

use serde::Serialize;

/// Network isolation strategy a sandbox was launched with.
///
/// Launching is a two-step policy: [`IsolationStrategy::NetworkDisabled`] is
/// always tried first, [`IsolationStrategy::HostNetwork`] once as a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationStrategy {
    /// No network stack at all.
    NetworkDisabled,
    /// Share the host network namespace.
    HostNetwork,
}

impl IsolationStrategy {
    /// Launch order: primary first, then the fallback.
    pub const ORDER: [Self; 2] = [Self::NetworkDisabled, Self::HostNetwork];

    /// Docker `network_mode` value for this strategy.
    pub fn network_mode(self) -> &'static str {
        match self {
            Self::NetworkDisabled => "none",
            Self::HostNetwork => "host",
        }
    }

    /// Whether the container config should set `network_disabled`.
    pub fn disables_network(self) -> bool {
        matches!(self, Self::NetworkDisabled)
    }
}

impl std::fmt::Display for IsolationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NetworkDisabled => write!(f, "network-disabled"),
            Self::HostNetwork => write!(f, "host-network"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_display() {
        assert_eq!(
            format!("{}", IsolationStrategy::NetworkDisabled),
            "network-disabled"
        );
        assert_eq!(format!("{}", IsolationStrategy::HostNetwork), "host-network");
    }

    #[test]
    fn test_primary_strategy_comes_first() {
        assert_eq!(IsolationStrategy::ORDER[0], IsolationStrategy::NetworkDisabled);
        assert!(IsolationStrategy::ORDER[0].disables_network());
        assert!(!IsolationStrategy::ORDER[1].disables_network());
    }

    #[test]
    fn test_network_mode() {
        assert_eq!(IsolationStrategy::NetworkDisabled.network_mode(), "none");
        assert_eq!(IsolationStrategy::HostNetwork.network_mode(), "host");
    }
}
