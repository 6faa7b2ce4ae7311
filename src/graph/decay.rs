//! Temporal weight engine.
//!
//! Relationships lose strength when no news touches them:
//!
//! ```text
//! w_decayed = w · e^(−λ · days)
//! ```
//!
//! [`EntityStore::update_weight`] blends a sentiment signal into the decayed
//! weight; [`EntityStore::apply_decay_to_all`] is the periodic sweep run by the
//! decay worker.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::error::{GraphError, Result};
use super::store::EntityStore;

/// Decay rate per day (≈ 14-day half-life).
pub const DEFAULT_DECAY_LAMBDA: f64 = 0.05;
/// The sweep never decays a weight below this floor.
pub const MIN_DECAYED_WEIGHT: f64 = 0.01;
/// Edges touched more recently than this are skipped by the sweep.
pub const SWEEP_MIN_AGE_DAYS: f64 = 1.0 / 24.0;
/// Smallest weight loss the sweep bothers to record.
pub const SWEEP_MIN_CHANGE: f64 = 0.001;
/// History event id of sweep-induced changes.
pub const DECAY_EVENT_ID: &str = "temporal_decay";

/// `e^(−λ · days)`.
pub fn decay_factor(lambda: f64, days: f64) -> f64 {
    (-lambda * days).exp()
}

/// Fractional days from `from` to `to`; zero if `to` precedes `from`.
pub fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let millis = (to - from).num_milliseconds().max(0);
    millis as f64 / 86_400_000.0
}

/// `clamp(w · e^(−λ·days) + sentiment · relevance, 0, 1)`.
pub fn blended_weight(weight: f64, days: f64, lambda: f64, sentiment: f64, relevance: f64) -> f64 {
    let decayed = weight * decay_factor(lambda, days);
    (decayed + sentiment * relevance).clamp(0.0, 1.0)
}

impl EntityStore {
    /// Decay every edge older than an hour by `lambda`.
    ///
    /// Returns the number of edges whose weight changed. `lambda` must be
    /// finite and non-negative.
    pub fn apply_decay_to_all(&self, lambda: f64) -> Result<usize> {
        self.apply_decay_to_all_at(lambda, Utc::now())
    }

    /// [`apply_decay_to_all`](Self::apply_decay_to_all) with an explicit clock.
    pub fn apply_decay_to_all_at(&self, lambda: f64, now: DateTime<Utc>) -> Result<usize> {
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(GraphError::InvalidInput(format!(
                "decay lambda must be finite and non-negative, got {lambda}"
            )));
        }

        let mut inner = self.inner.write();
        let graph = &mut inner.graph;
        let mut updated = 0;

        for idx in 0..graph.edges.len() {
            let edge = &graph.edges[idx];
            let days = elapsed_days(edge.timestamp, now);
            if days < SWEEP_MIN_AGE_DAYS {
                continue;
            }

            let previous = edge.weight;
            let weight = (previous * decay_factor(lambda, days)).max(MIN_DECAYED_WEIGHT);
            if previous - weight > SWEEP_MIN_CHANGE {
                graph.commit_weight(idx, weight, now, DECAY_EVENT_ID);
                updated += 1;
            }
        }

        debug!(updated, lambda, "Temporal decay sweep done");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::models::*;
    use chrono::Duration;

    #[test]
    fn test_decay_factor() {
        assert_eq!(decay_factor(0.05, 0.0), 1.0);
        assert!((decay_factor(0.05, 10.0) - 0.606_530_66).abs() < 1e-6);
        // Half-life of ~13.86 days
        assert!((decay_factor(0.05, 2f64.ln() / 0.05) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_elapsed_days_never_negative() {
        let now = Utc::now();
        assert_eq!(elapsed_days(now, now - Duration::days(3)), 0.0);
        assert!((elapsed_days(now - Duration::hours(36), now) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_blended_weight_clamps() {
        assert_eq!(blended_weight(0.9, 0.0, 0.05, 1.0, 1.0), 1.0);
        assert_eq!(blended_weight(0.1, 0.0, 0.05, -1.0, 1.0), 0.0);
        assert!((blended_weight(0.5, 0.0, 0.05, 0.2, 0.5) - 0.6).abs() < 1e-12);
    }

    fn store_with_edge(weight: f64, age: Duration, now: DateTime<Utc>) -> EntityStore {
        let store = EntityStore::new();
        store
            .add_relationship(
                CreateRelationship::new("a", "b", RelationshipType::Trade, weight).at(now - age),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_sweep_decays_old_edges() {
        let now = Utc::now();
        let store = store_with_edge(0.8, Duration::days(14), now);

        assert_eq!(store.apply_decay_to_all_at(0.05, now).unwrap(), 1);
        let edge = &store.all_edges()[0];
        let expected = 0.8 * (-0.05_f64 * 14.0).exp();
        assert!((edge.weight - expected).abs() < 1e-9);
        assert_eq!(edge.status, EdgeStatus::Active);
        assert_eq!(edge.timestamp, now);

        let history = store.history(&edge.key()).unwrap();
        assert_eq!(history.latest().unwrap().event_id.as_deref(), Some(DECAY_EVENT_ID));
    }

    #[test]
    fn test_sweep_skips_recent_edges() {
        let now = Utc::now();
        let store = store_with_edge(0.8, Duration::minutes(30), now);
        assert_eq!(store.apply_decay_to_all_at(0.05, now).unwrap(), 0);
        assert_eq!(store.all_edges()[0].weight, 0.8);
    }

    #[test]
    fn test_sweep_respects_floor() {
        let now = Utc::now();
        let store = store_with_edge(0.5, Duration::days(400), now);
        assert_eq!(store.apply_decay_to_all_at(0.05, now).unwrap(), 1);
        let edge = &store.all_edges()[0];
        assert_eq!(edge.weight, MIN_DECAYED_WEIGHT);
        assert_eq!(edge.status, EdgeStatus::Blocked);

        // Already at the floor: nothing more to record
        let later = now + Duration::days(30);
        assert_eq!(store.apply_decay_to_all_at(0.05, later).unwrap(), 0);
    }

    #[test]
    fn test_sweep_ignores_negligible_change() {
        let now = Utc::now();
        // 0.02 · (1 − e^(−0.05·0.5)) ≈ 0.0005 < 0.001
        let store = store_with_edge(0.02, Duration::hours(12), now);
        assert_eq!(store.apply_decay_to_all_at(0.05, now).unwrap(), 0);
        assert_eq!(store.all_edges()[0].weight, 0.02);
    }

    #[test]
    fn test_invalid_lambda_is_rejected() {
        let now = Utc::now();
        let store = store_with_edge(0.9, Duration::days(2), now);
        for lambda in [f64::NAN, f64::INFINITY, -0.05] {
            let err = store.apply_decay_to_all_at(lambda, now).unwrap_err();
            assert!(matches!(err, GraphError::InvalidInput(_)), "{lambda}");
        }

        let edge = &store.all_edges()[0];
        assert_eq!(edge.weight, 0.9);
        assert_eq!(edge.status, EdgeStatus::Active);
        assert_eq!(edge.timestamp, now - Duration::days(2));
        let last_event = store
            .history(&edge.key())
            .and_then(|h| h.latest().and_then(|s| s.event_id.clone()));
        assert_ne!(last_event.as_deref(), Some(DECAY_EVENT_ID));
    }

    #[test]
    fn test_zero_lambda_changes_nothing() {
        let now = Utc::now();
        let store = store_with_edge(0.8, Duration::days(90), now);
        assert_eq!(store.apply_decay_to_all_at(0.0, now).unwrap(), 0);
    }
}
