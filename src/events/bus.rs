//! In-process fan-out of [`GraphEvent`]s.

use super::{EventEmitter, GraphEvent};
use tokio::sync::broadcast;
use tracing::trace;

/// Buffered events per subscriber before the slowest one starts lagging.
const SNAPSHOT_BACKLOG: usize = 256;

/// Broadcast channel shared by the workers, the shock propagator and any
/// listener. Clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GraphEvent>,
}

impl EventBus {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
        }
    }

    /// Receives every event emitted after this call. A receiver that falls
    /// more than the capacity behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(SNAPSHOT_BACKLOG)
    }
}

impl EventEmitter for EventBus {
    fn emit(&self, event: GraphEvent) {
        let kind = event.kind;
        // Err only means nobody is listening
        let delivered = self.tx.send(event).unwrap_or(0);
        trace!(?kind, delivered, "Graph event published");
    }
}
