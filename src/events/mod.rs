//! Graph event system
//!
//! This module provides:
//! - `GraphEvent`: typed events emitted after shocks, sweeps, saves and for snapshots
//! - `EventBus`: broadcast channel for distributing events to subscribers

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{EventEmitter, GraphEvent, GraphEventKind};
