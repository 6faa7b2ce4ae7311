//! Economic graph data models.
//!
//! Defines the complete type system of the entity store:
//!
//! ## Nodes
//! - [`EntityCategory`] / [`Entity`]: nations, corporations, industries, commodities
//!
//! ## Edges
//! - [`RelationshipType`] / [`Relationship`]: typed, directed, weighted connections
//! - [`CreateRelationship`]: insertion request with optional fields filled by the store
//! - [`EdgeStatus`]: weight band label derived from the current weight
//! - [`Directionality`]: how a shock travels across an edge
//!
//! ## Temporal history
//! - [`EdgeKey`]: `(source, target, type)` identity of an edge
//! - [`EdgeSnapshot`] / [`EdgeHistory`]: append-only audit log of weight changes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lowest health an entity can fall to.
pub const MIN_HEALTH: f64 = 0.1;
/// Highest health an entity can reach.
pub const MAX_HEALTH: f64 = 2.0;
/// Neutral health assigned to entities created without one.
pub const NEUTRAL_HEALTH: f64 = 1.0;

// ============================================================================
// Entities
// ============================================================================

/// Category of an economic entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityCategory {
    Nation,
    Corporation,
    Industry,
    RawMaterial,
    Crop,
    /// Generic manufactured product
    Product,
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nation => write!(f, "Nation"),
            Self::Corporation => write!(f, "Corporation"),
            Self::Industry => write!(f, "Industry"),
            Self::RawMaterial => write!(f, "RawMaterial"),
            Self::Crop => write!(f, "Crop"),
            Self::Product => write!(f, "Product"),
        }
    }
}

impl FromStr for EntityCategory {
    type Err = String;

    /// Case-insensitive; `raw_material` and `raw-material` are accepted too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "nation" => Ok(Self::Nation),
            "corporation" => Ok(Self::Corporation),
            "industry" => Ok(Self::Industry),
            "rawmaterial" => Ok(Self::RawMaterial),
            "crop" => Ok(Self::Crop),
            "product" => Ok(Self::Product),
            _ => Err(format!("unknown entity category: {s}")),
        }
    }
}

impl EntityCategory {
    /// Raw materials and crops are both traded commodities.
    pub fn is_commodity(&self) -> bool {
        matches!(self, Self::RawMaterial | Self::Crop)
    }
}

fn neutral_health() -> f64 {
    NEUTRAL_HEALTH
}

/// Accept `null` wherever a collection is expected.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A node of the economic graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable key, unique within the store
    pub id: String,
    /// Category tag
    #[serde(rename = "type")]
    pub category: EntityCategory,
    /// Display name
    pub name: String,
    /// 1.0 = neutral, below = distressed, above = booming. Always in [0.1, 2.0].
    #[serde(default = "neutral_health")]
    pub health: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Auxiliary facts (GDP, population, ...)
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Entity {
    /// Create an entity with neutral health and no market data.
    pub fn new(id: impl Into<String>, category: EntityCategory, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category,
            name: name.into(),
            health: NEUTRAL_HEALTH,
            ticker: None,
            price: None,
            currency: None,
            last_updated: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_health(mut self, health: f64) -> Self {
        self.health = health;
        self
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = Some(ticker.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Clamp a health value into `[MIN_HEALTH, MAX_HEALTH]`.
pub fn clamp_health(health: f64) -> f64 {
    health.clamp(MIN_HEALTH, MAX_HEALTH)
}

// ============================================================================
// Relationships
// ============================================================================

/// Type of relationship between two entities.
///
/// Unknown type names survive a load/save cycle through [`RelationshipType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationshipType {
    Trade,
    Capital,
    Regulatory,
    /// Nation → Industry
    HasIndustry,
    /// Industry → Company
    HasCompany,
    /// Industry/Company → RawMaterial
    Requires,
    /// Nation → RawMaterial
    Produces,
    /// Commodity → Commodity
    SubstituteFor,
    /// Company → Company
    CompetesWith,
    /// Company → Supplier
    DependsOn,
    /// Supplier → Client
    Supplies,
    /// Client → Supplier
    ProcuresFrom,
    /// Company → Product
    Manufactures,
    /// Company → RawMaterial
    Consumes,
    Other(String),
}

impl RelationshipType {
    /// Every named type, in display order.
    pub const KNOWN: [RelationshipType; 14] = [
        Self::Supplies,
        Self::ProcuresFrom,
        Self::Manufactures,
        Self::Consumes,
        Self::Produces,
        Self::DependsOn,
        Self::Requires,
        Self::Trade,
        Self::Capital,
        Self::CompetesWith,
        Self::SubstituteFor,
        Self::Regulatory,
        Self::HasIndustry,
        Self::HasCompany,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Trade => "Trade",
            Self::Capital => "Capital",
            Self::Regulatory => "Regulatory",
            Self::HasIndustry => "HasIndustry",
            Self::HasCompany => "HasCompany",
            Self::Requires => "Requires",
            Self::Produces => "Produces",
            Self::SubstituteFor => "SubstituteFor",
            Self::CompetesWith => "CompetesWith",
            Self::DependsOn => "DependsOn",
            Self::Supplies => "Supplies",
            Self::ProcuresFrom => "ProcuresFrom",
            Self::Manufactures => "Manufactures",
            Self::Consumes => "Consumes",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RelationshipType {
    /// Resolve a type name; unrecognised names become [`RelationshipType::Other`].
    pub fn from_name(s: &str) -> Self {
        match s {
            "Trade" => Self::Trade,
            "Capital" => Self::Capital,
            "Regulatory" => Self::Regulatory,
            "HasIndustry" => Self::HasIndustry,
            "HasCompany" => Self::HasCompany,
            "Requires" => Self::Requires,
            "Produces" => Self::Produces,
            "SubstituteFor" => Self::SubstituteFor,
            "CompetesWith" => Self::CompetesWith,
            "DependsOn" => Self::DependsOn,
            "Supplies" => Self::Supplies,
            "ProcuresFrom" => Self::ProcuresFrom,
            "Manufactures" => Self::Manufactures,
            "Consumes" => Self::Consumes,
            other => Self::Other(other.to_string()),
        }
    }
}

impl FromStr for RelationshipType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl Serialize for RelationshipType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RelationshipType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_name(&raw))
    }
}

/// How a shock travels across an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Directionality {
    /// Source → target only (supplier to client)
    #[serde(alias = "Unidirectional")]
    Downstream,
    /// Target → source only (client back to supplier)
    #[serde(alias = "Reverse")]
    Upstream,
    /// Either way
    #[serde(alias = "Bidirectional")]
    Both,
}

impl fmt::Display for Directionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Downstream => write!(f, "Downstream"),
            Self::Upstream => write!(f, "Upstream"),
            Self::Both => write!(f, "Both"),
        }
    }
}

/// Older documents write an empty string for "not resolved yet".
fn unset_directionality<'de, D>(deserializer: D) -> Result<Option<Directionality>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::IntoDeserializer;

    match Option::<String>::deserialize(deserializer)?.as_deref() {
        None | Some("") => Ok(None),
        Some(name) => Directionality::deserialize(name.into_deserializer()).map(Some),
    }
}

/// Weight band of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeStatus {
    /// weight < 0.1
    Blocked,
    /// weight < 0.3
    Weak,
    /// weight < 0.7
    Active,
    /// weight ≥ 0.7
    Strong,
}

impl EdgeStatus {
    /// Band containing `weight`.
    pub fn from_weight(weight: f64) -> Self {
        if weight < 0.1 {
            Self::Blocked
        } else if weight < 0.3 {
            Self::Weak
        } else if weight < 0.7 {
            Self::Active
        } else {
            Self::Strong
        }
    }
}

impl fmt::Display for EdgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked => write!(f, "Blocked"),
            Self::Weak => write!(f, "Weak"),
            Self::Active => write!(f, "Active"),
            Self::Strong => write!(f, "Strong"),
        }
    }
}

/// A directed, typed, weighted edge as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "source_id")]
    pub source: String,
    #[serde(rename = "target_id")]
    pub target: String,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    /// Strength / influence, normally in [0, 1]
    pub weight: f64,
    /// Last time the weight was modified
    pub timestamp: DateTime<Utc>,
    pub status: EdgeStatus,
    /// Resolved once from `kind`; `None` only for edges that predate the field.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "unset_directionality"
    )]
    pub directionality: Option<Directionality>,
}

impl Relationship {
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source.clone(), self.target.clone(), self.kind.clone())
    }

    pub fn matches(&self, source: &str, target: &str, kind: &RelationshipType) -> bool {
        self.source == source && self.target == target && &self.kind == kind
    }
}

/// Insertion request for a relationship.
///
/// Unset fields are resolved by the store: timestamp → now, status → Active,
/// directionality → policy table lookup on `kind`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRelationship {
    pub source: String,
    pub target: String,
    pub kind: RelationshipType,
    pub weight: f64,
    pub timestamp: Option<DateTime<Utc>>,
    pub status: Option<EdgeStatus>,
    pub directionality: Option<Directionality>,
}

impl CreateRelationship {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        kind: RelationshipType,
        weight: f64,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            weight,
            timestamp: None,
            status: None,
            directionality: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_status(mut self, status: EdgeStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_directionality(mut self, directionality: Directionality) -> Self {
        self.directionality = Some(directionality);
        self
    }
}

// ============================================================================
// Temporal history
// ============================================================================

/// Identity of an edge: `(source, target, type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
    pub kind: RelationshipType,
}

impl EdgeKey {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: RelationshipType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
        }
    }
}

/// `source|target|type`, the key format of the persisted history map.
impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.source, self.target, self.kind)
    }
}

/// Point-in-time state of an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
    pub status: EdgeStatus,
    /// Event that caused the change (shock id, `temporal_decay`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

/// Append-only evolution of one relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeHistory {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    pub history: Vec<EdgeSnapshot>,
}

impl EdgeHistory {
    pub fn new(key: &EdgeKey) -> Self {
        Self {
            source_id: key.source.clone(),
            target_id: key.target.clone(),
            kind: key.kind.clone(),
            history: Vec::new(),
        }
    }

    pub fn latest(&self) -> Option<&EdgeSnapshot> {
        self.history.last()
    }
}
