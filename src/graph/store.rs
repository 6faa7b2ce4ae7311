//! In-memory entity store.
//!
//! Owns the four graph structures behind one reader-writer lock:
//! - entity map (`id → Entity`)
//! - append-only edge collection
//! - temporal history (`EdgeKey → EdgeHistory`)
//! - adjacency index (`source id → positions in the edge collection`)
//!
//! Every read hands back owned copies. Writers take the exclusive lock for a
//! single entity or edge at a time; there is no multi-step transaction, so a
//! reader running alongside a shock may observe it half applied.
//!
//! Edges may name entity ids that are not (yet) in the entity map. Such
//! endpoints are resolved lazily by readers: lookups return `None` and health
//! updates report the id as absent.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::decay::{blended_weight, elapsed_days, DEFAULT_DECAY_LAMBDA};
use super::directionality;
use super::error::{GraphError, Result};
use super::models::*;

/// Default number of entity/edge insertions between two autosave triggers.
pub const DEFAULT_AUTOSAVE_THRESHOLD: usize = 10;

// ============================================================================
// GraphState: the owned data behind the lock
// ============================================================================

/// Entities, edges, histories and the derived adjacency index.
///
/// Also the unit exchanged with persistence: [`EntityStore::replace`] swaps a
/// whole `GraphState` in, [`EntityStore::snapshot_state`] copies one out.
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    pub(crate) entities: HashMap<String, Entity>,
    pub(crate) edges: Vec<Relationship>,
    pub(crate) histories: HashMap<EdgeKey, EdgeHistory>,
    pub(crate) adjacency: HashMap<String, Vec<usize>>,
}

impl GraphState {
    /// Assemble a state from raw collections, rebuilding the adjacency index.
    pub fn from_parts(
        entities: HashMap<String, Entity>,
        edges: Vec<Relationship>,
        histories: HashMap<EdgeKey, EdgeHistory>,
    ) -> Self {
        let mut state = Self {
            entities,
            edges,
            histories,
            adjacency: HashMap::new(),
        };
        state.rebuild_adjacency();
        state
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn edges(&self) -> &[Relationship] {
        &self.edges
    }

    pub fn histories(&self) -> impl Iterator<Item = (&EdgeKey, &EdgeHistory)> {
        self.histories.iter()
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Outgoing edges of `id`, in insertion order.
    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &Relationship> {
        self.adjacency
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(move |&idx| self.edges.get(idx))
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }

    /// Recompute the adjacency index from the edge collection.
    pub(crate) fn rebuild_adjacency(&mut self) {
        let mut adjacency: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, edge) in self.edges.iter().enumerate() {
            adjacency.entry(edge.source.clone()).or_default().push(idx);
        }
        self.adjacency = adjacency;
    }

    /// Position of the first edge matching `(source, target, kind)`.
    pub(crate) fn find_edge(&self, source: &str, target: &str, kind: &RelationshipType) -> Option<usize> {
        self.adjacency
            .get(source)?
            .iter()
            .copied()
            .find(|&idx| self.edges[idx].matches(source, target, kind))
    }

    pub(crate) fn push_edge(&mut self, edge: Relationship) -> usize {
        let idx = self.edges.len();
        self.adjacency.entry(edge.source.clone()).or_default().push(idx);
        self.edges.push(edge);
        self.record_history(idx, None);
        idx
    }

    /// Append the current state of edge `idx` to its history.
    pub(crate) fn record_history(&mut self, idx: usize, event_id: Option<&str>) {
        let edge = &self.edges[idx];
        let key = edge.key();
        let snapshot = EdgeSnapshot {
            weight: edge.weight,
            timestamp: edge.timestamp,
            status: edge.status,
            event_id: event_id.map(str::to_string),
        };
        self.histories
            .entry(key.clone())
            .or_insert_with(|| EdgeHistory::new(&key))
            .history
            .push(snapshot);
    }

    /// Single write path for weight changes: set, reclassify, stamp, log.
    pub(crate) fn commit_weight(
        &mut self,
        idx: usize,
        weight: f64,
        now: DateTime<Utc>,
        event_id: &str,
    ) -> &Relationship {
        let edge = &mut self.edges[idx];
        edge.weight = weight;
        edge.status = EdgeStatus::from_weight(weight);
        edge.timestamp = now;
        self.record_history(idx, Some(event_id));
        &self.edges[idx]
    }

    /// True when the incremental index matches a from-scratch rebuild.
    pub fn adjacency_consistent(&self) -> bool {
        let mut rebuilt = self.clone();
        rebuilt.rebuild_adjacency();
        rebuilt.adjacency == self.adjacency
    }
}

// ============================================================================
// EntityStore
// ============================================================================

/// Notifies the persistence worker every `threshold` changes.
#[derive(Debug)]
struct AutosaveHook {
    threshold: usize,
    trigger: mpsc::Sender<()>,
}

#[derive(Debug, Default)]
pub(crate) struct Inner {
    pub(crate) graph: GraphState,
    changes_since_save: usize,
    autosave: Option<AutosaveHook>,
}

/// Node/edge counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphStats {
    pub entities: usize,
    pub edges: usize,
    pub histories: usize,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Graph(Nodes: {}, Edges: {})", self.entities, self.edges)
    }
}

/// Thread-safe owner of the economic graph.
///
/// Designed for sharing via `Arc<EntityStore>`.
#[derive(Debug)]
pub struct EntityStore {
    pub(crate) inner: RwLock<Inner>,
    decay_lambda: f64,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    /// Create an empty store using the default decay rate.
    pub fn new() -> Self {
        Self::with_decay_lambda(DEFAULT_DECAY_LAMBDA)
    }

    /// Create an empty store whose `update_weight` decays at `lambda` per day.
    pub fn with_decay_lambda(lambda: f64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            decay_lambda: lambda,
        }
    }

    pub fn decay_lambda(&self) -> f64 {
        self.decay_lambda
    }

    /// Request an autosave every `threshold` insertions.
    ///
    /// Returns the receiving end; the persistence worker saves whenever it
    /// yields. Triggers are dropped while one is already pending.
    pub fn enable_autosave(&self, threshold: usize) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        let mut inner = self.inner.write();
        inner.autosave = Some(AutosaveHook {
            threshold: threshold.max(1),
            trigger: tx,
        });
        inner.changes_since_save = 0;
        rx
    }

    fn note_change(inner: &mut Inner) {
        inner.changes_since_save += 1;
        let Some(hook) = inner.autosave.as_ref() else {
            return;
        };
        if inner.changes_since_save >= hook.threshold {
            inner.changes_since_save = 0;
            if hook.trigger.try_send(()).is_err() {
                debug!("Autosave already pending, trigger coalesced");
            }
        }
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Insert or overwrite an entity by id.
    ///
    /// A zero or non-finite health is treated as unset and becomes 1.0; any
    /// other value is clamped into range.
    pub fn add_entity(&self, mut entity: Entity) {
        if !entity.health.is_finite() || entity.health <= 0.0 {
            entity.health = NEUTRAL_HEALTH;
        }
        entity.health = clamp_health(entity.health);

        let mut inner = self.inner.write();
        inner.graph.entities.insert(entity.id.clone(), entity);
        Self::note_change(&mut inner);
    }

    /// Add `delta` to an entity's health, clamped to [0.1, 2.0].
    ///
    /// Returns the new health, or `None` if the id is unknown.
    pub fn update_health(&self, id: &str, delta: f64) -> Option<f64> {
        let mut inner = self.inner.write();
        let entity = inner.graph.entities.get_mut(id)?;
        if delta.is_finite() {
            entity.health = clamp_health(entity.health + delta);
        }
        Some(entity.health)
    }

    /// Record a market quote for an entity.
    pub fn update_price(
        &self,
        id: &str,
        price: f64,
        currency: &str,
        ticker: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let entity = inner
            .graph
            .entities
            .get_mut(id)
            .ok_or_else(|| GraphError::EntityNotFound(id.to_string()))?;
        entity.price = Some(price);
        entity.currency = Some(currency.to_string());
        if let Some(ticker) = ticker.filter(|t| !t.is_empty()) {
            entity.ticker = Some(ticker.to_string());
        }
        entity.last_updated = Some(Utc::now());
        Ok(())
    }

    pub fn ticker(&self, id: &str) -> Option<String> {
        self.inner.read().graph.entities.get(id)?.ticker.clone()
    }

    pub fn set_ticker(&self, id: &str, ticker: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let entity = inner
            .graph
            .entities
            .get_mut(id)
            .ok_or_else(|| GraphError::EntityNotFound(id.to_string()))?;
        entity.ticker = Some(ticker.to_string());
        Ok(())
    }

    pub fn entity(&self, id: &str) -> Option<Entity> {
        self.inner.read().graph.entities.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().graph.entities.contains_key(id)
    }

    pub fn all_entities(&self) -> Vec<Entity> {
        self.inner.read().graph.entities.values().cloned().collect()
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Append a relationship, resolving unset timestamp, status and directionality.
    ///
    /// Endpoints are not required to exist.
    pub fn add_relationship(&self, request: CreateRelationship) -> Result<Relationship> {
        if !request.weight.is_finite() {
            return Err(GraphError::InvalidInput(format!(
                "weight of {} -> {} ({}) is not finite",
                request.source, request.target, request.kind
            )));
        }
        let directionality = request
            .directionality
            .unwrap_or_else(|| directionality::directionality(&request.kind));
        let edge = Relationship {
            timestamp: request.timestamp.unwrap_or_else(Utc::now),
            status: request.status.unwrap_or(EdgeStatus::Active),
            directionality: Some(directionality),
            source: request.source,
            target: request.target,
            kind: request.kind,
            weight: request.weight,
        };

        let mut inner = self.inner.write();
        if !inner.graph.entities.contains_key(&edge.source)
            || !inner.graph.entities.contains_key(&edge.target)
        {
            debug!(
                source = %edge.source,
                target = %edge.target,
                "Relationship references an entity not in the store"
            );
        }
        inner.graph.push_edge(edge.clone());
        Self::note_change(&mut inner);
        Ok(edge)
    }

    /// Decay the edge to now, blend in `sentiment × relevance`, clamp to
    /// [0, 1], reclassify and log under `event_id`.
    pub fn update_weight(
        &self,
        source: &str,
        target: &str,
        kind: &RelationshipType,
        sentiment: f64,
        relevance: f64,
        event_id: &str,
    ) -> Result<Relationship> {
        self.update_weight_at(source, target, kind, sentiment, relevance, event_id, Utc::now())
    }

    /// [`update_weight`](Self::update_weight) with an explicit clock.
    #[allow(clippy::too_many_arguments)]
    pub fn update_weight_at(
        &self,
        source: &str,
        target: &str,
        kind: &RelationshipType,
        sentiment: f64,
        relevance: f64,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Relationship> {
        if !(-1.0..=1.0).contains(&sentiment) {
            return Err(GraphError::InvalidInput(format!(
                "sentiment {sentiment} outside [-1, 1]"
            )));
        }
        if !(0.0..=1.0).contains(&relevance) {
            return Err(GraphError::InvalidInput(format!(
                "relevance {relevance} outside [0, 1]"
            )));
        }

        let mut inner = self.inner.write();
        let idx = inner
            .graph
            .find_edge(source, target, kind)
            .ok_or_else(|| GraphError::EdgeNotFound {
                from: source.to_string(),
                to: target.to_string(),
                kind: kind.clone(),
            })?;

        let edge = &inner.graph.edges[idx];
        let days = elapsed_days(edge.timestamp, now);
        let weight = blended_weight(edge.weight, days, self.decay_lambda, sentiment, relevance);
        let previous = edge.weight;

        let updated = inner.graph.commit_weight(idx, weight, now, event_id).clone();
        debug!(
            source,
            target,
            kind = %kind,
            previous,
            weight = updated.weight,
            status = %updated.status,
            event_id,
            "Edge weight updated"
        );
        Ok(updated)
    }

    pub fn outgoing(&self, id: &str) -> Vec<Relationship> {
        self.inner.read().graph.outgoing(id).cloned().collect()
    }

    pub fn incoming(&self, id: &str) -> Vec<Relationship> {
        self.inner.read().graph.incoming(id).cloned().collect()
    }

    pub fn all_edges(&self) -> Vec<Relationship> {
        self.inner.read().graph.edges.clone()
    }

    pub fn history(&self, key: &EdgeKey) -> Option<EdgeHistory> {
        self.inner.read().graph.histories.get(key).cloned()
    }

    // ========================================================================
    // Snapshot iteration
    // ========================================================================

    /// Call `f` on a copy of every entity, without holding the lock.
    ///
    /// `f` may freely query or mutate the store.
    pub fn entities_range(&self, mut f: impl FnMut(&Entity)) {
        let snapshot = self.all_entities();
        for entity in &snapshot {
            f(entity);
        }
    }

    /// Call `f` on a copy of every edge, without holding the lock.
    pub fn edges_range(&self, mut f: impl FnMut(&Relationship)) {
        let snapshot = self.all_edges();
        for edge in &snapshot {
            f(edge);
        }
    }

    /// Run `f` against the state under the shared lock.
    ///
    /// `f` must not call back into the store.
    pub fn read<R>(&self, f: impl FnOnce(&GraphState) -> R) -> R {
        f(&self.inner.read().graph)
    }

    // ========================================================================
    // Whole-graph operations
    // ========================================================================

    /// Deep copy of the full state.
    pub fn snapshot_state(&self) -> GraphState {
        self.inner.read().graph.clone()
    }

    /// Swap in another graph atomically, rebuilding the adjacency index.
    pub fn replace(&self, mut other: GraphState) {
        other.rebuild_adjacency();
        let mut inner = self.inner.write();
        inner.graph = other;
        debug!(
            entities = inner.graph.entities.len(),
            edges = inner.graph.edges.len(),
            "Graph replaced"
        );
    }

    /// Remove every entity, edge and history entry.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.graph = GraphState::default();
        inner.changes_since_save = 0;
        tracing::info!("Graph cleared");
    }

    /// Rebuild the adjacency index from the edge collection.
    ///
    /// Returns `true` if the previous index had drifted.
    pub fn rebuild_adjacency(&self) -> bool {
        let mut inner = self.inner.write();
        let before = std::mem::take(&mut inner.graph.adjacency);
        inner.graph.rebuild_adjacency();
        let drifted = before != inner.graph.adjacency;
        if drifted {
            warn!("Adjacency index had drifted from the edge collection and was rebuilt");
        }
        drifted
    }

    pub fn stats(&self) -> GraphStats {
        let inner = self.inner.read();
        GraphStats {
            entities: inner.graph.entities.len(),
            edges: inner.graph.edges.len(),
            histories: inner.graph.histories.len(),
        }
    }
}
