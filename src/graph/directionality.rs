//! Directionality policy.
//!
//! Static lookup from relationship type to propagation mode and attenuation:
//!
//! | Group | Types | Mode | Attenuation |
//! |---|---|---|---|
//! | supply | Supplies, Manufactures, Produces | Downstream | 0.8–0.9 |
//! | procurement | ProcuresFrom, Requires, Consumes, DependsOn | Upstream | 0.7–0.8 |
//! | lateral | Trade, Capital, CompetesWith, SubstituteFor, Regulatory, HasIndustry, HasCompany | Both | 0.3–0.6 |
//!
//! Unknown types propagate both ways at 0.5.

use super::models::{Directionality, Relationship, RelationshipType};

/// Attenuation applied to types missing from the table.
pub const DEFAULT_ATTENUATION: f64 = 0.5;

/// Propagation mode for a relationship type.
pub fn directionality(kind: &RelationshipType) -> Directionality {
    use RelationshipType::*;
    match kind {
        // Supply chain: supplier -> client
        Supplies | Manufactures | Produces => Directionality::Downstream,

        // Procurement: a shock on the client reaches its supplier
        ProcuresFrom | Requires | Consumes | DependsOn => Directionality::Upstream,

        Trade | Capital | CompetesWith | SubstituteFor | Regulatory => Directionality::Both,

        // Industry membership: a member's trouble reaches its industry and back
        HasIndustry | HasCompany => Directionality::Both,

        Other(_) => Directionality::Both,
    }
}

/// Fraction of shock energy surviving one traversal of `kind`, in (0, 1].
pub fn attenuation(kind: &RelationshipType) -> f64 {
    use RelationshipType::*;
    match kind {
        Supplies | Manufactures => 0.9,
        Produces | DependsOn => 0.8,
        ProcuresFrom | Consumes | Requires => 0.7,
        Trade | HasIndustry => 0.6,
        Capital | HasCompany => 0.5,
        SubstituteFor | Regulatory => 0.4,
        // Competitors are only indirectly hit
        CompetesWith => 0.3,
        Other(_) => DEFAULT_ATTENUATION,
    }
}

/// Directionality an edge actually propagates with.
///
/// The value stored on the edge wins over the table; the table is consulted
/// only for edges that were never resolved.
pub fn effective_directionality(edge: &Relationship) -> Directionality {
    edge.directionality.unwrap_or_else(|| directionality(&edge.kind))
}

/// Whether a shock crosses `edge`.
///
/// `from_source` is true when the shock travels source → target.
pub fn should_propagate(edge: &Relationship, from_source: bool) -> bool {
    match effective_directionality(edge) {
        Directionality::Both => true,
        Directionality::Downstream => from_source,
        Directionality::Upstream => !from_source,
    }
}

/// One readable line describing how `kind` propagates.
pub fn describe(kind: &RelationshipType) -> String {
    let pct = attenuation(kind) * 100.0;
    match directionality(kind) {
        Directionality::Downstream => {
            format!("Downstream (supplier→client, {pct:.0}% propagation)")
        }
        Directionality::Upstream => format!("Upstream (client→supplier, {pct:.0}% propagation)"),
        Directionality::Both => format!("Both (either way, {pct:.0}% propagation)"),
    }
}

/// Arrow glyph used when printing an edge.
pub fn arrow(mode: Directionality) -> &'static str {
    match mode {
        Directionality::Downstream => "→",
        Directionality::Upstream => "←",
        Directionality::Both => "↔",
    }
}
