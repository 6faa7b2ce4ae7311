//! Shock simulation.
//!
//! - [`shock`]: plan/apply spreading activation of a disruption
//! - [`config`]: tunable constants ([`ShockConfig`])

pub mod config;
pub mod shock;

pub use config::ShockConfig;
pub use shock::{
    apply, effective_impact, plan, Mutation, ShockEvent, ShockPlan, ShockPropagator, ShockReport,
    Stage,
};
