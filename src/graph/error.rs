//! Graph errors

use thiserror::Error;

use super::models::RelationshipType;

/// Graph result type
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors returned by the entity store and its collaborators.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("edge not found: {from} -> {to} ({kind})")]
    EdgeNotFound {
        from: String,
        to: String,
        kind: RelationshipType,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EntityNotFound(_) | Self::EdgeNotFound { .. })
    }
}
