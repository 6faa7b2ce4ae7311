//! Tunable constants of the shock propagator.
//!
//! Every field can be set from the `shock` section of `config.yaml`.

use serde::{Deserialize, Serialize};

/// Parameters of [`ShockPropagator`](super::ShockPropagator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShockConfig {
    /// Lower bound on the target's health when used as resilience.
    pub min_resilience: f64,

    /// Health change applied to the shocked entity itself.
    pub target_health_penalty: f64,

    /// Base factor of the health penalty on downstream neighbours.
    /// Delta = −factor × (1 − effective impact) × attenuation.
    pub downstream_health_factor: f64,

    /// Base factor for upstream neighbours reached through reverse edges.
    pub upstream_health_factor: f64,

    /// Health boost for competitors and substitutes.
    pub winner_boost: f64,

    /// Activation below this does not ripple further.
    pub ripple_threshold: f64,

    /// Share of activation kept by the second hop.
    pub second_order_attenuation: f64,

    /// Relevance of the second-hop weight update (indirect link).
    pub second_order_relevance: f64,

    /// Activation above which a third-order value is recorded.
    pub third_order_threshold: f64,

    /// Share of second-order activation recorded for the third hop.
    pub third_order_fraction: f64,
}

impl Default for ShockConfig {
    fn default() -> Self {
        Self {
            min_resilience: 0.1,
            target_health_penalty: -0.2,
            downstream_health_factor: 0.1,
            upstream_health_factor: 0.05,
            winner_boost: 0.15,
            ripple_threshold: 0.05,
            second_order_attenuation: 0.5,
            second_order_relevance: 0.7,
            third_order_threshold: 0.15,
            third_order_fraction: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg: ShockConfig = serde_yaml::from_str("winner_boost: 0.3\n").unwrap();
        assert_eq!(cfg.winner_boost, 0.3);
        assert_eq!(cfg.target_health_penalty, -0.2);
        assert_eq!(cfg.second_order_relevance, 0.7);
    }
}
