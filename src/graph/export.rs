//! Graph export for visualisation.
//!
//! - [`GraphSnapshot`]: flat `nodes` + `links` JSON, the shape force-directed
//!   layouts consume
//! - DOT: Graphviz text rendered through `petgraph::dot`

use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use super::error::Result;
use super::models::{EdgeStatus, EntityCategory, RelationshipType};
use super::store::{EntityStore, GraphState};

/// A node as exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub category: EntityCategory,
    pub health: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
}

impl NodeData {
    fn fill_color(&self) -> &'static str {
        match self.category {
            EntityCategory::Nation => "lightblue",
            EntityCategory::Corporation => "salmon",
            EntityCategory::Industry => "lightyellow",
            EntityCategory::RawMaterial => "lightgreen",
            _ => "lightgrey",
        }
    }
}

/// Multi-line DOT label: name, category, health and price when known.
impl fmt::Display for NodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n({})\nHealth: {:.2}", self.name, self.category, self.health)?;
        if let Some(price) = self.price.filter(|p| *p > 0.0) {
            write!(f, "\n${price:.2}")?;
        }
        Ok(())
    }
}

/// An edge as exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkData {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    pub weight: f64,
    pub status: EdgeStatus,
}

impl fmt::Display for LinkData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// Node/link view of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeData>,
    pub links: Vec<LinkData>,
}

impl From<&GraphState> for GraphSnapshot {
    fn from(state: &GraphState) -> Self {
        let mut nodes: Vec<NodeData> = state
            .entities()
            .map(|e| NodeData {
                id: e.id.clone(),
                name: e.name.clone(),
                category: e.category,
                health: e.health,
                price: e.price,
                ticker: e.ticker.clone(),
            })
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let links = state
            .edges()
            .iter()
            .map(|e| LinkData {
                source: e.source.clone(),
                target: e.target.clone(),
                kind: e.kind.clone(),
                weight: e.weight,
                status: e.status,
            })
            .collect();

        Self { nodes, links }
    }
}

impl GraphSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Build a petgraph view of the snapshot.
    ///
    /// Links whose endpoints are not exported nodes are left out.
    pub fn to_petgraph(&self) -> DiGraph<&NodeData, &LinkData> {
        let mut graph = DiGraph::with_capacity(self.nodes.len(), self.links.len());
        let index: HashMap<&str, NodeIndex> = self
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), graph.add_node(n)))
            .collect();

        let mut skipped = 0usize;
        for link in &self.links {
            match (index.get(link.source.as_str()), index.get(link.target.as_str())) {
                (Some(&s), Some(&t)) => {
                    graph.add_edge(s, t, link);
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!(skipped, "Links with unknown endpoints left out of export graph");
        }
        graph
    }

    /// Render as a Graphviz digraph, left to right, nodes filled by category.
    pub fn to_dot(&self) -> String {
        let graph = self.to_petgraph();
        let body = Dot::with_attr_getters(
            &graph,
            &[Config::GraphContentOnly, Config::EdgeNoLabel, Config::NodeNoLabel],
            &|_, edge| {
                let link = *edge.weight();
                format!("label = {:?}, weight = {:.2}", link.to_string(), link.weight)
            },
            &|_, (_, node)| {
                format!(
                    "label = {:?}, fillcolor = {}, tooltip = {:?}",
                    node.to_string(),
                    node.fill_color(),
                    node.id
                )
            },
        );

        format!(
            "digraph EconGraph {{\n    rankdir=LR;\n    node [shape=box, style=filled, fontname=\"Arial\"];\n{body}}}\n"
        )
    }
}

impl EntityStore {
    /// Node/link snapshot of the current graph.
    pub fn export_snapshot(&self) -> GraphSnapshot {
        self.read(|g| GraphSnapshot::from(g))
    }

    pub fn to_json(&self) -> Result<String> {
        self.export_snapshot().to_json()
    }

    pub fn to_dot(&self) -> String {
        self.export_snapshot().to_dot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::models::*;

    fn sample() -> EntityStore {
        let store = EntityStore::new();
        store.add_entity(Entity::new("us", EntityCategory::Nation, "United States"));
        let mut apple = Entity::new("apple", EntityCategory::Corporation, "Apple").with_ticker("AAPL");
        apple.price = Some(189.5);
        store.add_entity(apple);
        store
            .add_relationship(CreateRelationship::new("us", "apple", RelationshipType::HasCompany, 0.8))
            .unwrap();
        store
            .add_relationship(CreateRelationship::new("apple", "ghost", RelationshipType::Trade, 0.2))
            .unwrap();
        store
    }

    #[test]
    fn test_snapshot_json_shape() {
        let store = sample();
        let json: serde_json::Value = serde_json::from_str(&store.to_json().unwrap()).unwrap();
        assert_eq!(json["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(json["links"].as_array().unwrap().len(), 2);

        let apple = &json["nodes"][0];
        assert_eq!(apple["id"], "apple");
        assert_eq!(apple["type"], "Corporation");
        assert_eq!(apple["ticker"], "AAPL");
        assert!(json["nodes"][1].get("price").is_none());

        assert_eq!(json["links"][0]["type"], "HasCompany");
        assert_eq!(json["links"][0]["status"], "Active");
    }

    #[test]
    fn test_dot_output() {
        let store = sample();
        let dot = store.to_dot();
        assert!(dot.starts_with("digraph EconGraph {"));
        assert!(dot.contains("rankdir=LR"));
        assert!(dot.contains("fillcolor = salmon"));
        assert!(dot.contains("fillcolor = lightblue"));
        assert!(dot.contains("HasCompany"));
        assert!(dot.contains("$189.50"));
        // Dangling link is not drawn
        assert!(!dot.contains("\"Trade\""));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_petgraph_view_counts() {
        let snapshot = sample().export_snapshot();
        let graph = snapshot.to_petgraph();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }
}
