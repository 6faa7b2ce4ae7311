//! Directionality migration for graphs written before edges carried it.

use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

use super::directionality::directionality;
use super::models::{Directionality, Relationship};
use super::store::EntityStore;

/// Edge counts per stored directionality (`None` = never resolved).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectionalityReport {
    pub total: usize,
    pub counts: BTreeMap<Option<Directionality>, usize>,
}

impl fmt::Display for DirectionalityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Edge Directionality Report")?;
        writeln!(f, "{}", "=".repeat(48))?;
        writeln!(f, "Total Edges: {}", self.total)?;
        for (mode, count) in &self.counts {
            let label = mode.map_or_else(|| "Unset".to_string(), |m| m.to_string());
            let pct = if self.total == 0 {
                0.0
            } else {
                *count as f64 / self.total as f64 * 100.0
            };
            writeln!(f, "  {label:<12} {count:>5} ({pct:.1}%)")?;
        }
        write!(f, "{}", "=".repeat(48))
    }
}

impl EntityStore {
    /// Resolve directionality on every edge that lacks it. Returns how many changed.
    pub fn migrate_directionality(&self) -> usize {
        let mut inner = self.inner.write();
        let mut updated = 0;
        for edge in inner.graph.edges.iter_mut() {
            if edge.directionality.is_none() {
                edge.directionality = Some(directionality(&edge.kind));
                updated += 1;
            }
        }
        if updated > 0 {
            info!(updated, "Migrated edge directionality");
        }
        updated
    }

    /// Descriptions of every edge still missing directionality; empty when valid.
    pub fn validate_directionality(&self) -> Vec<String> {
        self.read(|g| {
            g.edges()
                .iter()
                .enumerate()
                .filter(|(_, e)| e.directionality.is_none())
                .map(|(i, e)| format!("edge {i}: {} -> {} [{}]", e.source, e.target, e.kind))
                .collect()
        })
    }

    pub fn directionality_report(&self) -> DirectionalityReport {
        self.read(|g| {
            let mut report = DirectionalityReport {
                total: g.edges().len(),
                ..Default::default()
            };
            for edge in g.edges() {
                *report.counts.entry(edge.directionality).or_default() += 1;
            }
            report
        })
    }

    /// Edges whose stored directionality equals `mode`.
    pub fn edges_by_directionality(&self, mode: Directionality) -> Vec<Relationship> {
        self.read(|g| {
            g.edges()
                .iter()
                .filter(|e| e.directionality == Some(mode))
                .cloned()
                .collect()
        })
    }
}
