//! Time-evolving economic knowledge graph.
//!
//! Nations, corporations, industries and commodities connected by typed,
//! weighted, directed relationships whose strength decays over time.
//!
//! ## Architecture
//!
//! ```text
//!                 EntityStore  (one RwLock over entities, edges, histories, adjacency)
//!                      │
//!   ┌──────────┬───────┼──────────┬────────────┬──────────┐
//! decay     queries  migration  persistence   export    simulation::shock
//! ```
//!
//! ## Modules
//!
//! - [`models`]: Entity, Relationship, EdgeHistory and their enums
//! - [`directionality`]: propagation mode and attenuation per relationship type
//! - [`store`]: `EntityStore` and its copy-returning read API
//! - [`decay`]: weight blending and the periodic decay sweep
//! - [`queries`]: supplier/client/material/product lookups, supply-chain discovery
//! - [`migration`]: directionality migration and validation
//! - [`persistence`]: JSON save/load
//! - [`export`]: node/link snapshot and Graphviz DOT
//! - [`error`]: `GraphError`

pub mod decay;
pub mod directionality;
pub mod error;
pub mod export;
pub mod migration;
pub mod models;
pub mod persistence;
pub mod queries;
pub mod store;

// Re-export primary types for convenience
pub use error::{GraphError, Result};
pub use export::{GraphSnapshot, LinkData, NodeData};
pub use migration::DirectionalityReport;
pub use models::{
    CreateRelationship, Directionality, EdgeHistory, EdgeKey, EdgeSnapshot, EdgeStatus, Entity,
    EntityCategory, Relationship, RelationshipType,
};
pub use persistence::GraphDocument;
pub use queries::CompanyRelations;
pub use store::{EntityStore, GraphState, GraphStats};
