//! EconGraph
//!
//! A time-evolving economic knowledge graph with:
//! - Typed, weighted, directed relationships between nations, corporations,
//!   industries and commodities
//! - Temporal decay of relationship strength
//! - Directional supply-shock propagation (spreading activation)
//! - JSON persistence, Graphviz export and background maintenance workers

pub mod events;
pub mod graph;
pub mod simulation;
pub mod workers;

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use events::EventBus;
use graph::EntityStore;
use simulation::{ShockConfig, ShockPropagator};

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub graph: GraphYamlConfig,
    pub autosave: AutosaveYamlConfig,
    pub workers: WorkersYamlConfig,
    pub shock: ShockConfig,
    pub logging: LoggingYamlConfig,
}

/// Graph storage section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphYamlConfig {
    /// Graph document loaded at startup and written after CLI mutations
    pub path: String,
    /// Temporal decay rate per day
    pub decay_lambda: f64,
}

impl Default for GraphYamlConfig {
    fn default() -> Self {
        Self {
            path: "data/graph.json".into(),
            decay_lambda: graph::decay::DEFAULT_DECAY_LAMBDA,
        }
    }
}

/// Autosave section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutosaveYamlConfig {
    pub enabled: bool,
    /// Target file; defaults to `graph.path`
    pub path: Option<String>,
    /// Insertions between two saves
    pub threshold: usize,
    /// Wall-clock safety net
    pub interval_secs: u64,
}

impl Default for AutosaveYamlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            threshold: graph::store::DEFAULT_AUTOSAVE_THRESHOLD,
            interval_secs: 300,
        }
    }
}

/// Background worker intervals
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkersYamlConfig {
    pub decay_interval_secs: u64,
    pub index_rebuild_interval_secs: u64,
    pub broadcast_interval_secs: u64,
    /// Broadcast even without changes after this long
    pub broadcast_heartbeat_secs: u64,
}

impl Default for WorkersYamlConfig {
    fn default() -> Self {
        Self {
            decay_interval_secs: 30 * 60,
            index_rebuild_interval_secs: 10 * 60,
            broadcast_interval_secs: 5,
            broadcast_heartbeat_secs: 30,
        }
    }
}

/// Logging section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingYamlConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingYamlConfig {
    fn default() -> Self {
        Self {
            level: "info,econgraph=debug".into(),
            json: false,
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub graph_path: PathBuf,
    pub decay_lambda: f64,
    /// `None` disables autosave
    pub autosave_path: Option<PathBuf>,
    pub autosave_threshold: usize,
    pub autosave_interval: Duration,
    pub workers: WorkersYamlConfig,
    pub shock: ShockConfig,
    pub log_level: String,
    pub log_json: bool,
}

impl Config {
    /// Equivalent to `from_yaml_and_env(None)`.
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. A missing file falls
    /// back to env vars and defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let graph_path = std::env::var("ECONGRAPH_GRAPH_PATH").unwrap_or(yaml.graph.path);
        let autosave_path = std::env::var("ECONGRAPH_AUTOSAVE_PATH")
            .ok()
            .or(yaml.autosave.path)
            .unwrap_or_else(|| graph_path.clone());

        let decay_lambda = match std::env::var("ECONGRAPH_DECAY_LAMBDA") {
            Ok(raw) => raw.parse().map_err(|e| {
                anyhow::anyhow!("ECONGRAPH_DECAY_LAMBDA must be a number, got {raw:?}: {e}")
            })?,
            Err(_) => yaml.graph.decay_lambda,
        };
        if !decay_lambda.is_finite() || decay_lambda < 0.0 {
            anyhow::bail!("decay lambda must be a non-negative number, got {decay_lambda}");
        }

        Ok(Self {
            graph_path: PathBuf::from(graph_path),
            decay_lambda,
            autosave_path: yaml.autosave.enabled.then(|| PathBuf::from(autosave_path)),
            autosave_threshold: std::env::var("ECONGRAPH_AUTOSAVE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.autosave.threshold),
            autosave_interval: Duration::from_secs(yaml.autosave.interval_secs),
            workers: yaml.workers,
            shock: yaml.shock,
            log_level: std::env::var("ECONGRAPH_LOG_LEVEL").unwrap_or(yaml.logging.level),
            log_json: yaml.logging.json,
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EntityStore>,
    pub events: EventBus,
    pub propagator: Arc<ShockPropagator>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build the store, loading `config.graph_path` when it exists.
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(EntityStore::with_decay_lambda(config.decay_lambda));
        if tokio::fs::try_exists(&config.graph_path).await? {
            store.load(&config.graph_path).await?;
        } else {
            tracing::info!(
                "No graph at {}, starting empty",
                config.graph_path.display()
            );
        }

        let events = EventBus::default();
        let propagator = Arc::new(
            ShockPropagator::new(Arc::clone(&store))
                .with_config(config.shock.clone())
                .with_emitter(Arc::new(events.clone())),
        );

        Ok(Self {
            store,
            events,
            propagator,
            config: Arc::new(config),
        })
    }

    /// Write the graph back to `config.graph_path`.
    pub async fn save(&self) -> Result<()> {
        self.store.save(&self.config.graph_path).await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
