//! Shock Propagator
//!
//! Pushes a disruption on one entity out through the graph in three phases:
//!
//! 1. **Direct**: the target loses health; every outgoing edge that carries a
//!    forward shock is weakened and its far endpoint is penalised. Incoming
//!    edges that carry shocks upstream do the same to their source, at half
//!    strength.
//! 2. **Winners**: competitors and substitutes gain health.
//! 3. **Ripple**: entities hit in phase 1 with enough activation weaken their
//!    own outgoing edges; strong activations record a third-order value.
//!
//! Propagation is split into a pure [`plan`] over a graph snapshot, producing
//! a list of [`Mutation`]s, and an [`apply`] step that issues them one by one
//! through the store. A reader running concurrently may therefore see a
//! partially applied shock. Propagation never runs more than three hops and
//! never re-enters the target.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{EventEmitter, GraphEvent, GraphEventKind};
use crate::graph::directionality::{attenuation, should_propagate};
use crate::graph::error::{GraphError, Result};
use crate::graph::models::{RelationshipType, Relationship};
use crate::graph::store::{EntityStore, GraphState};

use super::config::ShockConfig;

// ============================================================================
// Input
// ============================================================================

/// A disruption on one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShockEvent {
    /// Id of the shocked entity
    pub target: String,
    pub description: String,
    /// Remaining flow: 1.0 = no disruption, 0.0 = total stoppage.
    pub impact: f64,
}

impl ShockEvent {
    pub fn new(target: impl Into<String>, description: impl Into<String>, impact: f64) -> Self {
        Self {
            target: target.into(),
            description: description.into(),
            impact,
        }
    }

    /// Reject impact factors outside [0, 1].
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.impact) {
            return Err(GraphError::InvalidInput(format!(
                "impact factor {} outside [0, 1]",
                self.impact
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Phase a mutation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Target,
    Downstream,
    Upstream,
    Winner,
    SecondOrder,
}

/// One store call of a shock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    Health {
        stage: Stage,
        entity: String,
        delta: f64,
    },
    Weight {
        stage: Stage,
        source: String,
        target: String,
        kind: RelationshipType,
        sentiment: f64,
        relevance: f64,
        event_id: String,
    },
}

impl Mutation {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Health { stage, .. } | Self::Weight { stage, .. } => *stage,
        }
    }
}

/// Everything a shock will do, computed from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShockPlan {
    pub run_id: Uuid,
    pub event: ShockEvent,
    pub resilience: f64,
    /// Impact after resilience scaling, in [0, 1]
    pub effective_impact: f64,
    pub mutations: Vec<Mutation>,
    /// Entities reached in phase 1, in visit order, without duplicates
    pub directly_impacted: Vec<String>,
    pub winners: Vec<String>,
    /// Activation energy per entity (target included)
    pub activation: BTreeMap<String, f64>,
    /// Bookkeeping-only activation one hop past the ripple
    pub third_order: BTreeMap<String, f64>,
}

impl ShockPlan {
    pub fn count(&self, stage: Stage) -> usize {
        self.mutations.iter().filter(|m| m.stage() == stage).count()
    }
}

/// `1 − (1 − impact) / max(health, floor)`, clamped to [0, 1].
pub fn effective_impact(impact: f64, health: f64, min_resilience: f64) -> f64 {
    let resilience = health.max(min_resilience);
    (1.0 - (1.0 - impact) / resilience).clamp(0.0, 1.0)
}

fn record_activation(map: &mut BTreeMap<String, f64>, id: &str, value: f64) {
    let slot = map.entry(id.to_string()).or_insert(0.0);
    *slot = slot.max(value);
}

fn weight_mutation(stage: Stage, edge: &Relationship, sentiment: f64, relevance: f64, event_id: String) -> Mutation {
    Mutation::Weight {
        stage,
        source: edge.source.clone(),
        target: edge.target.clone(),
        kind: edge.kind.clone(),
        sentiment: sentiment.clamp(-1.0, 1.0),
        relevance,
        event_id,
    }
}

/// Compute the mutations of `event` against `graph` without touching it.
///
/// Fails only when the target is missing. Edges whose far endpoint is not a
/// known entity are skipped.
pub fn plan(graph: &GraphState, event: &ShockEvent, config: &ShockConfig) -> Result<ShockPlan> {
    event.validate()?;
    let target = graph
        .entity(&event.target)
        .ok_or_else(|| GraphError::EntityNotFound(event.target.clone()))?;
    let target_id = target.id.as_str();

    let resilience = target.health.max(config.min_resilience);
    let effective = effective_impact(event.impact, target.health, config.min_resilience);
    let shock = 1.0 - effective;

    let mut mutations = vec![Mutation::Health {
        stage: Stage::Target,
        entity: target_id.to_string(),
        delta: config.target_health_penalty,
    }];
    let mut activation = BTreeMap::from([(target_id.to_string(), shock)]);
    let mut impacted: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    // Phase 1a: forward across outgoing edges
    for (n, edge) in graph.outgoing(target_id).enumerate() {
        if edge.target == target_id || graph.entity(&edge.target).is_none() {
            continue;
        }
        if !should_propagate(edge, true) {
            debug!(
                source = %edge.source,
                target = %edge.target,
                kind = %edge.kind,
                "Skipping edge: does not carry shocks downstream"
            );
            continue;
        }
        let att = attenuation(&edge.kind);
        mutations.push(weight_mutation(
            Stage::Downstream,
            edge,
            -shock,
            1.0,
            format!("shock_{target_id}_{n}"),
        ));
        mutations.push(Mutation::Health {
            stage: Stage::Downstream,
            entity: edge.target.clone(),
            delta: -config.downstream_health_factor * shock * att,
        });
        record_activation(&mut activation, &edge.target, shock * edge.weight * att);
        if seen.insert(edge.target.clone()) {
            impacted.push(edge.target.clone());
        }
    }

    // Phase 1b: backward across incoming edges that carry shocks upstream
    for edge in graph.incoming(target_id) {
        if edge.source == target_id || graph.entity(&edge.source).is_none() {
            continue;
        }
        if !should_propagate(edge, false) {
            continue;
        }
        let att = attenuation(&edge.kind);
        mutations.push(weight_mutation(
            Stage::Upstream,
            edge,
            -shock,
            1.0,
            format!("shock_{target_id}_reverse"),
        ));
        mutations.push(Mutation::Health {
            stage: Stage::Upstream,
            entity: edge.source.clone(),
            delta: -config.upstream_health_factor * shock * att,
        });
        record_activation(&mut activation, &edge.source, shock * edge.weight * att);
        if seen.insert(edge.source.clone()) {
            impacted.push(edge.source.clone());
        }
    }

    // Phase 2: winners
    let winners = find_winners(graph, target_id);
    for winner in &winners {
        mutations.push(Mutation::Health {
            stage: Stage::Winner,
            entity: winner.clone(),
            delta: config.winner_boost,
        });
    }

    // Phase 3: ripple from every directly impacted entity
    let mut third_order = BTreeMap::new();
    for id in &impacted {
        let energy = activation.get(id).copied().unwrap_or(0.0);
        if energy < config.ripple_threshold {
            continue;
        }
        for edge in graph.outgoing(id) {
            if edge.target == target_id || !should_propagate(edge, true) {
                continue;
            }
            mutations.push(weight_mutation(
                Stage::SecondOrder,
                edge,
                -energy * config.second_order_attenuation,
                config.second_order_relevance,
                format!("shock_{target_id}_2nd_{id}"),
            ));
            if energy > config.third_order_threshold {
                record_activation(&mut third_order, &edge.target, energy * config.third_order_fraction);
            }
        }
    }

    Ok(ShockPlan {
        run_id: Uuid::new_v4(),
        event: event.clone(),
        resilience,
        effective_impact: effective,
        mutations,
        directly_impacted: impacted,
        winners,
        activation,
        third_order,
    })
}

/// Entities that gain from a shock on `target`.
///
/// - either end of a `CompetesWith` edge touching the target
/// - the source of a `SubstituteFor` edge pointing at the target or at a
///   commodity the target `Produces`
fn find_winners(graph: &GraphState, target: &str) -> Vec<String> {
    let mut focus: HashSet<&str> = graph
        .outgoing(target)
        .filter(|e| e.kind == RelationshipType::Produces)
        .map(|e| e.target.as_str())
        .collect();
    focus.insert(target);

    let mut seen = HashSet::new();
    let mut winners = Vec::new();
    for edge in graph.edges() {
        let candidate = match edge.kind {
            RelationshipType::CompetesWith if edge.source == target => &edge.target,
            RelationshipType::CompetesWith if edge.target == target => &edge.source,
            RelationshipType::SubstituteFor if focus.contains(edge.target.as_str()) => &edge.source,
            _ => continue,
        };
        if candidate == target || focus.contains(candidate.as_str()) {
            continue;
        }
        if graph.entity(candidate).is_some() && seen.insert(candidate.clone()) {
            winners.push(candidate.clone());
        }
    }
    winners
}

// ============================================================================
// Apply
// ============================================================================

/// Outcome of a shock run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShockReport {
    pub run_id: Uuid,
    pub target: String,
    pub description: String,
    pub effective_impact: f64,
    pub directly_impacted: Vec<String>,
    pub winners: Vec<String>,
    pub second_order_updates: usize,
    pub third_order: BTreeMap<String, f64>,
    /// Store calls that succeeded
    pub applied: usize,
    /// Store calls that failed; never fatal
    pub failed: usize,
}

/// Issue the mutations of `plan` one at a time. Individual failures are
/// logged and counted.
pub fn apply(store: &EntityStore, plan: &ShockPlan) -> ShockReport {
    let mut applied = 0;
    let mut failed = 0;

    for mutation in &plan.mutations {
        let outcome = match mutation {
            Mutation::Health { entity, delta, .. } => store
                .update_health(entity, *delta)
                .map(|_| ())
                .ok_or_else(|| GraphError::EntityNotFound(entity.clone())),
            Mutation::Weight {
                source,
                target,
                kind,
                sentiment,
                relevance,
                event_id,
                ..
            } => store
                .update_weight(source, target, kind, *sentiment, *relevance, event_id)
                .map(|_| ()),
        };
        match outcome {
            Ok(()) => applied += 1,
            Err(e) => {
                warn!(run_id = %plan.run_id, stage = ?mutation.stage(), error = %e, "Shock mutation failed");
                failed += 1;
            }
        }
    }

    ShockReport {
        run_id: plan.run_id,
        target: plan.event.target.clone(),
        description: plan.event.description.clone(),
        effective_impact: plan.effective_impact,
        directly_impacted: plan.directly_impacted.clone(),
        winners: plan.winners.clone(),
        second_order_updates: plan.count(Stage::SecondOrder),
        third_order: plan.third_order.clone(),
        applied,
        failed,
    }
}

// ============================================================================
// Propagator
// ============================================================================

/// Runs shocks against a shared store.
///
/// Designed for injection via `Arc<ShockPropagator>`.
pub struct ShockPropagator {
    store: Arc<EntityStore>,
    config: ShockConfig,
    emitter: Option<Arc<dyn EventEmitter>>,
}

impl ShockPropagator {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self {
            store,
            config: ShockConfig::default(),
            emitter: None,
        }
    }

    pub fn with_config(mut self, config: ShockConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish a `shock` event after every run.
    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn config(&self) -> &ShockConfig {
        &self.config
    }

    /// Plan against the current graph without applying anything.
    pub fn preview(&self, event: &ShockEvent) -> Result<ShockPlan> {
        self.store.read(|g| plan(g, event, &self.config))
    }

    /// Plan and apply `event`. Runs to completion on the calling thread.
    pub fn run(&self, event: &ShockEvent) -> Result<ShockReport> {
        info!(
            target = %event.target,
            description = %event.description,
            impact = event.impact,
            "Simulating shock"
        );
        let plan = self.preview(event)?;
        debug!(
            run_id = %plan.run_id,
            resilience = plan.resilience,
            effective_impact = plan.effective_impact,
            mutations = plan.mutations.len(),
            "Shock planned"
        );

        let report = apply(&self.store, &plan);
        info!(
            run_id = %report.run_id,
            directly_impacted = report.directly_impacted.len(),
            winners = report.winners.len(),
            second_order = report.second_order_updates,
            failed = report.failed,
            "Shock applied"
        );

        if let Some(emitter) = &self.emitter {
            emitter.emit(GraphEvent::new(GraphEventKind::Shock).with_serialized(&report));
        }
        Ok(report)
    }
}
