//! JSON persistence of the entity store.
//!
//! Document layout:
//!
//! ```json
//! {
//!   "nodes": { "<id>": Entity, ... },
//!   "edges": [ Relationship, ... ],
//!   "edge_histories": { "<source>|<target>|<type>": EdgeHistory, ... }
//! }
//! ```
//!
//! The adjacency index is never written; it is rebuilt on load.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use super::directionality::directionality;
use super::error::Result;
use super::models::{clamp_health, EdgeHistory, EdgeKey, Entity, Relationship, NEUTRAL_HEALTH};
use super::store::{EntityStore, GraphState};

/// Serialized form of a [`GraphState`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: BTreeMap<String, Entity>,
    #[serde(default)]
    pub edges: Vec<Relationship>,
    #[serde(default)]
    pub edge_histories: BTreeMap<String, EdgeHistory>,
}

impl From<&GraphState> for GraphDocument {
    fn from(state: &GraphState) -> Self {
        Self {
            nodes: state.entities().map(|e| (e.id.clone(), e.clone())).collect(),
            edges: state.edges().to_vec(),
            edge_histories: state
                .histories()
                .map(|(key, history)| (key.to_string(), history.clone()))
                .collect(),
        }
    }
}

impl GraphDocument {
    /// Convert into a live state, resolving directionality on legacy edges.
    ///
    /// History entries are re-keyed from their own fields, so ids containing
    /// `|` survive.
    pub fn into_state(self) -> (GraphState, usize) {
        let mut edges = self.edges;
        let mut migrated = 0;
        for edge in edges.iter_mut().filter(|e| e.directionality.is_none()) {
            edge.directionality = Some(directionality(&edge.kind));
            migrated += 1;
        }

        let entities: HashMap<String, Entity> = self
            .nodes
            .into_iter()
            .map(|(id, mut entity)| {
                entity.id = id.clone();
                if !entity.health.is_finite() || entity.health <= 0.0 {
                    entity.health = NEUTRAL_HEALTH;
                }
                entity.health = clamp_health(entity.health);
                (id, entity)
            })
            .collect();
        let histories: HashMap<EdgeKey, EdgeHistory> = self
            .edge_histories
            .into_values()
            .map(|h| {
                let key = EdgeKey::new(h.source_id.clone(), h.target_id.clone(), h.kind.clone());
                (key, h)
            })
            .collect();

        (GraphState::from_parts(entities, edges, histories), migrated)
    }
}

impl EntityStore {
    /// Write the full store to `path` as pretty JSON.
    ///
    /// The state is copied under the read lock and serialized outside it. The
    /// file is written next to `path` and renamed into place.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let document = self.read(|g| GraphDocument::from(g));
        let content = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;

        info!(
            path = %path.display(),
            entities = document.nodes.len(),
            edges = document.edges.len(),
            "Graph saved"
        );
        Ok(())
    }

    /// Read a document from `path` and replace the store's contents with it.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await?;
        let document: GraphDocument = serde_json::from_str(&content)?;
        let (state, migrated) = document.into_state();
        if migrated > 0 {
            debug!(migrated, "Resolved directionality on legacy edges");
        }

        let (entities, edges) = (state.entities.len(), state.edges.len());
        self.replace(state);
        info!(path = %path.display(), entities, edges, "Graph loaded");
        Ok(())
    }

    /// Open a store from `path`, decaying at `lambda`.
    pub async fn open(path: impl AsRef<Path>, lambda: f64) -> Result<Self> {
        let store = Self::with_decay_lambda(lambda);
        store.load(path).await?;
        Ok(store)
    }
}
