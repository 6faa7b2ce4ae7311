//! Graph event types for subscribers

use serde::{Deserialize, Serialize};

/// What happened to the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphEventKind {
    /// Full node/link snapshot, payload is a `GraphSnapshot`
    Snapshot,
    /// A shock finished, payload is a `ShockReport`
    Shock,
    /// A decay sweep changed edges
    Decay,
    /// The graph was written to disk
    Saved,
}

/// An event emitted after a graph mutation or maintenance run
///
/// Must be Clone for `tokio::sync::broadcast`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEvent {
    pub kind: GraphEventKind,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl GraphEvent {
    /// Create a new GraphEvent with the current timestamp
    pub fn new(kind: GraphEventKind) -> Self {
        Self {
            kind,
            payload: serde_json::Value::Null,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Serialize `value` as the payload; unserializable values leave it null.
    pub fn with_serialized<T: Serialize>(self, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(payload) => self.with_payload(payload),
            Err(e) => {
                tracing::warn!(kind = ?self.kind, error = %e, "Event payload not serializable");
                self
            }
        }
    }
}

/// Sink for graph events
///
/// Emitting is fire-and-forget and must never block the caller.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: GraphEvent);
}
