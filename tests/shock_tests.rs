//! Shock propagation and decay scenarios against the public API.

use std::sync::Arc;

use chrono::{Duration, Utc};
use econgraph::graph::{
    CreateRelationship, EdgeKey, EdgeStatus, Entity, EntityCategory, EntityStore,
    RelationshipType,
};
use econgraph::graph::models::{MAX_HEALTH, MIN_HEALTH};
use econgraph::simulation::{Mutation, ShockEvent, ShockPropagator, Stage};

const EPS: f64 = 1e-9;

fn corp(id: &str) -> Entity {
    Entity::new(id, EntityCategory::Corporation, id.to_uppercase())
}

fn edge(source: &str, target: &str, kind: RelationshipType, weight: f64) -> CreateRelationship {
    CreateRelationship::new(source, target, kind, weight)
}

fn health(store: &EntityStore, id: &str) -> f64 {
    store.entity(id).map(|e| e.health).unwrap_or(f64::NAN)
}

/// A (1.0) --Supplies 0.9--> B, with B --ProcuresFrom--> A on the way back.
fn supply_pair() -> Arc<EntityStore> {
    let store = Arc::new(EntityStore::new());
    store.add_entity(corp("a"));
    store.add_entity(corp("b"));
    store
        .add_relationship(edge("a", "b", RelationshipType::Supplies, 0.9))
        .unwrap();
    store
        .add_relationship(edge("b", "a", RelationshipType::ProcuresFrom, 0.6))
        .unwrap();
    store
}

#[test]
fn test_supplier_shock_scenario() {
    let store = supply_pair();
    let propagator = ShockPropagator::new(Arc::clone(&store));

    let report = propagator
        .run(&ShockEvent::new("a", "Factory fire", 0.1))
        .unwrap();

    assert!((report.effective_impact - 0.1).abs() < EPS);
    assert!((health(&store, "a") - 0.8).abs() < EPS);
    assert_eq!(report.directly_impacted, vec!["b".to_string()]);
    assert_eq!(report.failed, 0);

    // Forward: sentiment −0.9 on a fresh 0.9 edge
    let supplies = &store.outgoing("a")[0];
    assert_eq!(supplies.kind, RelationshipType::Supplies);
    assert!(supplies.weight < 0.9);
    assert_eq!(supplies.status, EdgeStatus::from_weight(supplies.weight));

    // Reverse scan reaches the upstream ProcuresFrom edge
    let key = EdgeKey::new("b", "a", RelationshipType::ProcuresFrom);
    let history = store.history(&key).unwrap();
    assert_eq!(
        history.latest().unwrap().event_id.as_deref(),
        Some("shock_a_reverse")
    );
    assert!(store.outgoing("b")[0].weight < 0.6);

    // Downstream penalty 0.1·0.9·0.9 plus upstream penalty 0.05·0.9·0.7
    let expected = 1.0 - 0.1 * 0.9 * 0.9 - 0.05 * 0.9 * 0.7;
    assert!((health(&store, "b") - expected).abs() < 1e-6);
}

#[test]
fn test_downstream_edge_not_crossed_backwards() {
    let store = Arc::new(EntityStore::new());
    store.add_entity(corp("x"));
    store.add_entity(corp("a"));
    store
        .add_relationship(edge("x", "a", RelationshipType::Supplies, 0.8))
        .unwrap();

    let report = ShockPropagator::new(Arc::clone(&store))
        .run(&ShockEvent::new("a", "Strike", 0.0))
        .unwrap();

    assert!(report.directly_impacted.is_empty());
    assert!((health(&store, "x") - 1.0).abs() < EPS);
    assert!((store.outgoing("x")[0].weight - 0.8).abs() < EPS);
}

#[test]
fn test_industry_membership_carries_shock_both_ways() {
    let store = Arc::new(EntityStore::new());
    store.add_entity(Entity::new("semis", EntityCategory::Industry, "Semiconductors"));
    store.add_entity(corp("tsmc"));
    store
        .add_relationship(edge("semis", "tsmc", RelationshipType::HasCompany, 0.8))
        .unwrap();
    let propagator = ShockPropagator::new(Arc::clone(&store));

    // Member to industry, against the edge
    let report = propagator
        .run(&ShockEvent::new("tsmc", "Earthquake", 0.5))
        .unwrap();
    assert_eq!(report.directly_impacted, vec!["semis".to_string()]);
    assert!(health(&store, "semis") < 1.0);
    assert!(store.outgoing("semis")[0].weight < 0.8);

    // Industry to member, along the edge
    let before = health(&store, "tsmc");
    let report = propagator
        .run(&ShockEvent::new("semis", "Export ban", 0.5))
        .unwrap();
    assert_eq!(report.directly_impacted, vec!["tsmc".to_string()]);
    assert!(health(&store, "tsmc") < before);
}

#[test]
fn test_competitor_is_winner() {
    let store = Arc::new(EntityStore::new());
    store.add_entity(corp("a"));
    store.add_entity(corp("c"));
    store
        .add_relationship(edge("a", "c", RelationshipType::CompetesWith, 0.9))
        .unwrap();
    let propagator = ShockPropagator::new(Arc::clone(&store));
    let event = ShockEvent::new("a", "Recall", 0.1);

    let plan = propagator.preview(&event).unwrap();
    let boosts: Vec<f64> = plan
        .mutations
        .iter()
        .filter_map(|m| match m {
            Mutation::Health {
                stage: Stage::Winner,
                entity,
                delta,
            } if entity == "c" => Some(*delta),
            _ => None,
        })
        .collect();
    assert_eq!(boosts, vec![0.15]);

    let report = propagator.run(&event).unwrap();
    assert_eq!(report.winners, vec!["c".to_string()]);
    // CompetesWith carries the shock too: −0.1·0.9·0.3, then +0.15
    let expected = 1.0 - 0.1 * 0.9 * 0.3 + 0.15;
    assert!((health(&store, "c") - expected).abs() < 1e-6);
}

#[test]
fn test_winner_boost_is_clamped() {
    let store = Arc::new(EntityStore::new());
    store.add_entity(corp("a"));
    store.add_entity(corp("c").with_health(1.99));
    store
        .add_relationship(edge("c", "a", RelationshipType::CompetesWith, 0.1))
        .unwrap();

    ShockPropagator::new(Arc::clone(&store))
        .run(&ShockEvent::new("a", "Recall", 1.0))
        .unwrap();

    assert!((health(&store, "c") - MAX_HEALTH).abs() < EPS);
}

#[test]
fn test_missing_target_changes_nothing() {
    let store = supply_pair();
    let before_edges = store.all_edges();

    let err = ShockPropagator::new(Arc::clone(&store))
        .run(&ShockEvent::new("ghost", "Nothing", 0.2))
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(store.all_edges(), before_edges);
    assert!((health(&store, "a") - 1.0).abs() < EPS);
}

#[test]
fn test_invalid_impact_rejected() {
    let store = supply_pair();
    let propagator = ShockPropagator::new(Arc::clone(&store));
    assert!(propagator.run(&ShockEvent::new("a", "bad", 1.5)).is_err());
    assert!(propagator.run(&ShockEvent::new("a", "bad", -0.1)).is_err());
    assert!((health(&store, "a") - 1.0).abs() < EPS);
}

#[test]
fn test_repeated_shocks_keep_invariants() {
    let store = Arc::new(EntityStore::new());
    let ids = ["n0", "n1", "n2", "n3", "n4", "n5"];
    for id in ids {
        store.add_entity(corp(id));
    }
    let kinds = [
        RelationshipType::Supplies,
        RelationshipType::ProcuresFrom,
        RelationshipType::Trade,
        RelationshipType::CompetesWith,
        RelationshipType::DependsOn,
    ];
    for (i, src) in ids.iter().enumerate() {
        for (j, dst) in ids.iter().enumerate() {
            if i != j && (i + j) % 2 == 1 {
                let kind = kinds[(i * 3 + j) % kinds.len()].clone();
                store
                    .add_relationship(edge(src, dst, kind, 0.2 + 0.1 * j as f64))
                    .unwrap();
            }
        }
    }

    let propagator = ShockPropagator::new(Arc::clone(&store));
    for round in 0..20 {
        let target = ids[round % ids.len()];
        let impact = (round % 5) as f64 / 4.0;
        propagator
            .run(&ShockEvent::new(target, "round", impact))
            .unwrap();
    }

    for e in store.all_entities() {
        assert!(
            (MIN_HEALTH..=MAX_HEALTH).contains(&e.health),
            "{} health {}",
            e.id,
            e.health
        );
    }
    for r in store.all_edges() {
        assert!((0.0..=1.0).contains(&r.weight));
        assert_eq!(r.status, EdgeStatus::from_weight(r.weight));
    }
}

#[test]
fn test_decay_is_monotonic_and_guarded() {
    let store = EntityStore::new();
    let start = Utc::now() - Duration::days(20);
    store
        .add_relationship(edge("a", "b", RelationshipType::Trade, 0.9).at(start))
        .unwrap();
    store
        .add_relationship(edge("b", "c", RelationshipType::Supplies, 0.4).at(start))
        .unwrap();

    let mut now = Utc::now();
    let mut previous: Vec<f64> = store.all_edges().iter().map(|e| e.weight).collect();
    for _ in 0..5 {
        store.apply_decay_to_all_at(0.05, now).unwrap();
        let current: Vec<f64> = store.all_edges().iter().map(|e| e.weight).collect();
        for (before, after) in previous.iter().zip(&current) {
            assert!(after <= before);
            assert!(*after >= 0.01);
        }
        previous = current;

        // Same instant again: the one-hour guard makes it a no-op
        assert_eq!(store.apply_decay_to_all_at(0.05, now).unwrap(), 0);
        now += Duration::days(3);
    }
}
