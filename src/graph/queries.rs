//! Supply-chain queries over corporations.
//!
//! Supplier/client links are read from both edge spellings:
//! `S --Supplies--> C` and `C --ProcuresFrom--> S` describe the same pair.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

use super::error::{GraphError, Result};
use super::models::*;
use super::store::{EntityStore, GraphState};

/// Everything the store knows about one company's supply chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRelations {
    pub company_id: String,
    pub company_name: String,
    pub suppliers: Vec<Entity>,
    pub clients: Vec<Entity>,
    pub raw_materials: Vec<Entity>,
    pub products: Vec<Entity>,
}

/// Resolve `ids` to entities of an accepted category, first occurrence wins.
fn collect<'a>(
    graph: &GraphState,
    ids: impl Iterator<Item = &'a str>,
    accept: impl Fn(EntityCategory) -> bool,
) -> Vec<Entity> {
    let mut seen = HashSet::new();
    ids.filter_map(|id| graph.entity(id))
        .filter(|e| accept(e.category) && seen.insert(e.id.clone()))
        .cloned()
        .collect()
}

fn suppliers_of(graph: &GraphState, company: &str) -> Vec<Entity> {
    let ids = graph.edges().iter().filter_map(|e| match e.kind {
        RelationshipType::Supplies if e.target == company => Some(e.source.as_str()),
        RelationshipType::ProcuresFrom if e.source == company => Some(e.target.as_str()),
        _ => None,
    });
    collect(graph, ids, |c| c == EntityCategory::Corporation)
}

fn clients_of(graph: &GraphState, company: &str) -> Vec<Entity> {
    let ids = graph.edges().iter().filter_map(|e| match e.kind {
        RelationshipType::Supplies if e.source == company => Some(e.target.as_str()),
        RelationshipType::ProcuresFrom if e.target == company => Some(e.source.as_str()),
        _ => None,
    });
    collect(graph, ids, |c| c == EntityCategory::Corporation)
}

fn raw_materials_of(graph: &GraphState, company: &str) -> Vec<Entity> {
    let ids = graph
        .outgoing(company)
        .filter(|e| matches!(e.kind, RelationshipType::Requires | RelationshipType::Consumes))
        .map(|e| e.target.as_str());
    collect(graph, ids, |c| c.is_commodity())
}

fn products_of(graph: &GraphState, company: &str) -> Vec<Entity> {
    let ids = graph
        .outgoing(company)
        .filter(|e| e.kind == RelationshipType::Manufactures)
        .map(|e| e.target.as_str());
    collect(graph, ids, |c| c == EntityCategory::Product)
}

impl EntityStore {
    /// Corporations supplying `company`.
    pub fn suppliers(&self, company: &str) -> Vec<Entity> {
        self.read(|g| suppliers_of(g, company))
    }

    /// Corporations `company` supplies.
    pub fn clients(&self, company: &str) -> Vec<Entity> {
        self.read(|g| clients_of(g, company))
    }

    /// Raw materials and crops `company` requires or consumes.
    pub fn raw_materials(&self, company: &str) -> Vec<Entity> {
        self.read(|g| raw_materials_of(g, company))
    }

    pub fn products(&self, company: &str) -> Vec<Entity> {
        self.read(|g| products_of(g, company))
    }

    /// Full supply-chain view of a corporation, from one consistent snapshot.
    pub fn company_relations(&self, company: &str) -> Result<CompanyRelations> {
        self.read(|g| {
            let entity = g
                .entity(company)
                .ok_or_else(|| GraphError::EntityNotFound(company.to_string()))?;
            if entity.category != EntityCategory::Corporation {
                return Err(GraphError::InvalidInput(format!(
                    "{company} is a {}, not a corporation",
                    entity.category
                )));
            }
            Ok(CompanyRelations {
                company_id: entity.id.clone(),
                company_name: entity.name.clone(),
                suppliers: suppliers_of(g, company),
                clients: clients_of(g, company),
                raw_materials: raw_materials_of(g, company),
                products: products_of(g, company),
            })
        })
    }

    /// Every corporation, sorted by id.
    pub fn companies(&self) -> Vec<Entity> {
        let mut companies: Vec<Entity> = self.read(|g| {
            g.entities()
                .filter(|e| e.category == EntityCategory::Corporation)
                .cloned()
                .collect()
        });
        companies.sort_by(|a, b| a.id.cmp(&b.id));
        companies
    }

    /// Materialise explicit supply edges from corporate `DependsOn` links.
    ///
    /// For every `A --DependsOn--> B` between two corporations, adds
    /// `B --Supplies--> A` and `A --ProcuresFrom--> B` when missing, copying
    /// weight and status. Returns the number of edges added.
    pub fn discover_supply_chain(&self) -> usize {
        let mut inner = self.inner.write();
        let graph = &mut inner.graph;
        let now = Utc::now();

        let mut existing: HashSet<EdgeKey> = graph.edges.iter().map(Relationship::key).collect();
        let candidates: Vec<Relationship> = {
            let view: &GraphState = graph;
            let is_corp = |id: &str| {
                view.entity(id)
                    .is_some_and(|e| e.category == EntityCategory::Corporation)
            };
            view.edges
                .iter()
                .filter(|e| e.kind == RelationshipType::DependsOn)
                .filter(|e| is_corp(&e.source) && is_corp(&e.target))
                .cloned()
                .collect()
        };

        let mut added = 0;
        for dep in candidates {
            let derived = [
                (
                    dep.target.clone(),
                    dep.source.clone(),
                    RelationshipType::Supplies,
                    Directionality::Downstream,
                ),
                (
                    dep.source.clone(),
                    dep.target.clone(),
                    RelationshipType::ProcuresFrom,
                    Directionality::Upstream,
                ),
            ];
            for (source, target, kind, directionality) in derived {
                let key = EdgeKey::new(source.clone(), target.clone(), kind.clone());
                if !existing.insert(key) {
                    continue;
                }
                graph.push_edge(Relationship {
                    source,
                    target,
                    kind,
                    weight: dep.weight,
                    timestamp: now,
                    status: dep.status,
                    directionality: Some(directionality),
                });
                added += 1;
            }
        }

        if added > 0 {
            info!(added, "Discovered supply chain edges from DependsOn relationships");
        }
        added
    }
}
