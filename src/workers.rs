//! Background maintenance workers.
//!
//! Four independent loops share the store through `Arc<EntityStore>`:
//!
//! | Worker        | Default period | Effect                                              |
//! |---------------|----------------|-----------------------------------------------------|
//! | decay         | 30 min         | `apply_decay_to_all(λ)`, emits `decay`              |
//! | autosave      | threshold / 5 min | writes the graph document, emits `saved`         |
//! | index rebuild | 10 min         | rebuilds the adjacency index                        |
//! | broadcast     | 5 s            | emits a `snapshot` when counts change or on heartbeat |
//!
//! Every loop selects on a shared [`CancellationToken`]; [`Workers::shutdown`]
//! cancels it and waits for all of them. The autosave worker writes once more
//! on the way out. A zero period disables the corresponding worker.
//!
//! ```
//! use std::sync::Arc;
//! use econgraph::events::EventBus;
//! use econgraph::graph::EntityStore;
//! use econgraph::workers::{WorkerSettings, Workers};
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(EntityStore::new());
//! let bus = EventBus::default();
//! let workers = Workers::start(store, Arc::new(bus), &WorkerSettings::default());
//! assert_eq!(workers.len(), 3);
//! workers.shutdown().await;
//! # });
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{EventEmitter, GraphEvent, GraphEventKind};
use crate::graph::{EntityStore, GraphStats};
use crate::Config;

/// Where and how often the autosave worker writes.
#[derive(Debug, Clone, PartialEq)]
pub struct AutosaveSettings {
    pub path: PathBuf,
    /// Insertions between two threshold-triggered saves
    pub threshold: usize,
    /// Periodic save regardless of the threshold
    pub interval: Duration,
}

/// Periods and parameters of the background workers.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub decay_lambda: f64,
    pub decay_interval: Duration,
    pub index_rebuild_interval: Duration,
    pub broadcast_interval: Duration,
    pub broadcast_heartbeat: Duration,
    pub autosave: Option<AutosaveSettings>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            decay_lambda: crate::graph::decay::DEFAULT_DECAY_LAMBDA,
            decay_interval: Duration::from_secs(30 * 60),
            index_rebuild_interval: Duration::from_secs(10 * 60),
            broadcast_interval: Duration::from_secs(5),
            broadcast_heartbeat: Duration::from_secs(30),
            autosave: None,
        }
    }
}

impl From<&Config> for WorkerSettings {
    fn from(config: &Config) -> Self {
        Self {
            decay_lambda: config.decay_lambda,
            decay_interval: Duration::from_secs(config.workers.decay_interval_secs),
            index_rebuild_interval: Duration::from_secs(config.workers.index_rebuild_interval_secs),
            broadcast_interval: Duration::from_secs(config.workers.broadcast_interval_secs),
            broadcast_heartbeat: Duration::from_secs(config.workers.broadcast_heartbeat_secs),
            autosave: config.autosave_path.as_ref().map(|path| AutosaveSettings {
                path: path.clone(),
                threshold: config.autosave_threshold,
                interval: config.autosave_interval,
            }),
        }
    }
}

/// Handles to the running workers.
pub struct Workers {
    token: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Workers {
    /// Spawn every worker whose period is non-zero.
    ///
    /// Enabling autosave installs the store's insertion counter hook.
    pub fn start(
        store: Arc<EntityStore>,
        emitter: Arc<dyn EventEmitter>,
        settings: &WorkerSettings,
    ) -> Self {
        let token = CancellationToken::new();
        let mut handles = Vec::new();

        if settings.decay_interval.is_zero() {
            debug!("Decay worker disabled");
        } else {
            handles.push((
                "decay",
                spawn_decay_worker(
                    Arc::clone(&store),
                    settings.decay_lambda,
                    settings.decay_interval,
                    Arc::clone(&emitter),
                    token.clone(),
                ),
            ));
        }

        match &settings.autosave {
            Some(autosave) if !autosave.interval.is_zero() => {
                let trigger = store.enable_autosave(autosave.threshold);
                handles.push((
                    "autosave",
                    spawn_autosave_worker(
                        Arc::clone(&store),
                        autosave.path.clone(),
                        trigger,
                        autosave.interval,
                        Arc::clone(&emitter),
                        token.clone(),
                    ),
                ));
            }
            _ => debug!("Autosave worker disabled"),
        }

        if settings.index_rebuild_interval.is_zero() {
            debug!("Index rebuild worker disabled");
        } else {
            handles.push((
                "index_rebuild",
                spawn_index_worker(
                    Arc::clone(&store),
                    settings.index_rebuild_interval,
                    token.clone(),
                ),
            ));
        }

        if settings.broadcast_interval.is_zero() {
            debug!("Broadcast worker disabled");
        } else {
            handles.push((
                "broadcast",
                spawn_broadcast_worker(
                    store,
                    settings.broadcast_interval,
                    settings.broadcast_heartbeat,
                    emitter,
                    token.clone(),
                ),
            ));
        }

        info!(count = handles.len(), "Background workers started");
        Self { token, handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// A clone of the shared cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel every worker and wait for them to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                warn!(worker = name, error = %e, "Worker terminated abnormally");
            }
        }
        info!("Background workers stopped");
    }
}

/// Ticker whose first tick fires one full period from now.
fn delayed_ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Periodically decay every edge by `lambda`.
pub fn spawn_decay_worker(
    store: Arc<EntityStore>,
    lambda: f64,
    period: Duration,
    emitter: Arc<dyn EventEmitter>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = delayed_ticker(period);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let start = std::time::Instant::now();
                    match store.apply_decay_to_all(lambda) {
                        Ok(0) => debug!(lambda, "Decay sweep found nothing to update"),
                        Ok(updated) => {
                            info!(updated, lambda, elapsed = ?start.elapsed(), "Decay sweep applied");
                            emitter.emit(
                                GraphEvent::new(GraphEventKind::Decay)
                                    .with_payload(serde_json::json!({ "updated": updated, "lambda": lambda })),
                            );
                        }
                        Err(e) => warn!(error = %e, "Decay sweep rejected"),
                    }
                }
            }
        }
        debug!("Decay worker stopped");
    })
}

async fn save_once(
    store: &EntityStore,
    path: &Path,
    reason: &str,
    emitter: &dyn EventEmitter,
) {
    match store.save(path).await {
        Ok(()) => {
            debug!(path = %path.display(), reason, "Autosave complete");
            emitter.emit(GraphEvent::new(GraphEventKind::Saved).with_payload(serde_json::json!({
                "path": path.display().to_string(),
                "reason": reason,
            })));
        }
        Err(e) => warn!(path = %path.display(), reason, error = %e, "Autosave failed"),
    }
}

/// Save on every store trigger, every `period`, and once more on cancellation.
pub fn spawn_autosave_worker(
    store: Arc<EntityStore>,
    path: PathBuf,
    mut trigger: mpsc::Receiver<()>,
    period: Duration,
    emitter: Arc<dyn EventEmitter>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = delayed_ticker(period);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    save_once(&store, &path, "shutdown", emitter.as_ref()).await;
                    break;
                }
                Some(()) = trigger.recv() => {
                    save_once(&store, &path, "threshold", emitter.as_ref()).await;
                }
                _ = ticker.tick() => {
                    save_once(&store, &path, "interval", emitter.as_ref()).await;
                }
            }
        }
        debug!("Autosave worker stopped");
    })
}

/// Periodically rebuild the adjacency index from the edge collection.
pub fn spawn_index_worker(
    store: Arc<EntityStore>,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = delayed_ticker(period);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if !store.rebuild_adjacency() {
                        debug!("Adjacency index rebuilt, no drift");
                    }
                }
            }
        }
        debug!("Index rebuild worker stopped");
    })
}

/// Emit a full snapshot whenever node/edge counts change, or after
/// `heartbeat` without one. The first snapshot goes out immediately.
pub fn spawn_broadcast_worker(
    store: Arc<EntityStore>,
    period: Duration,
    heartbeat: Duration,
    emitter: Arc<dyn EventEmitter>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last: Option<(GraphStats, Instant)> = None;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let stats = store.stats();
                    let due = match last {
                        None => true,
                        Some((seen, sent_at)) => seen != stats || sent_at.elapsed() >= heartbeat,
                    };
                    if due {
                        let snapshot = store.export_snapshot();
                        emitter.emit(GraphEvent::new(GraphEventKind::Snapshot).with_serialized(&snapshot));
                        debug!(%stats, "Snapshot broadcast");
                        last = Some((stats, Instant::now()));
                    }
                }
            }
        }
        debug!("Broadcast worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::graph::{CreateRelationship, Entity, EntityCategory, RelationshipType};
    use tokio::sync::broadcast;

    const WAIT: Duration = Duration::from_secs(5);

    async fn next_of(rx: &mut broadcast::Receiver<GraphEvent>, kind: GraphEventKind) -> GraphEvent {
        tokio::time::timeout(WAIT, async {
            loop {
                match rx.recv().await {
                    Ok(event) if event.kind == kind => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("bus closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    fn corp(id: &str) -> Entity {
        Entity::new(id, EntityCategory::Corporation, id.to_uppercase())
    }

    #[tokio::test]
    async fn test_decay_worker_sweeps_and_emits() {
        let store = Arc::new(EntityStore::new());
        store.add_entity(corp("a"));
        store.add_entity(corp("b"));
        store
            .add_relationship(
                CreateRelationship::new("a", "b", RelationshipType::Supplies, 0.8)
                    .at(chrono::Utc::now() - chrono::Duration::days(10)),
            )
            .unwrap();

        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let token = CancellationToken::new();
        let handle = spawn_decay_worker(
            Arc::clone(&store),
            0.05,
            Duration::from_millis(20),
            Arc::new(bus.clone()),
            token.clone(),
        );

        let event = next_of(&mut rx, GraphEventKind::Decay).await;
        assert_eq!(event.payload["updated"], 1);
        let weight = store.outgoing("a")[0].weight;
        assert!(weight < 0.8);
        assert!(weight >= 0.01);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_decay_worker_skips_invalid_lambda() {
        let store = Arc::new(EntityStore::new());
        store
            .add_relationship(
                CreateRelationship::new("a", "b", RelationshipType::Trade, 0.9)
                    .at(chrono::Utc::now() - chrono::Duration::days(2)),
            )
            .unwrap();

        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let token = CancellationToken::new();
        let handle = spawn_decay_worker(
            Arc::clone(&store),
            f64::NAN,
            Duration::from_millis(10),
            Arc::new(bus.clone()),
            token.clone(),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(store.outgoing("a")[0].weight, 0.9);
        assert!(!handle.is_finished());

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_autosave_on_threshold_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let store = Arc::new(EntityStore::new());
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let settings = WorkerSettings {
            decay_interval: Duration::ZERO,
            index_rebuild_interval: Duration::ZERO,
            broadcast_interval: Duration::ZERO,
            autosave: Some(AutosaveSettings {
                path: path.clone(),
                threshold: 2,
                interval: Duration::from_secs(3600),
            }),
            ..WorkerSettings::default()
        };
        let workers = Workers::start(Arc::clone(&store), Arc::new(bus.clone()), &settings);
        assert_eq!(workers.len(), 1);

        store.add_entity(corp("a"));
        store.add_entity(corp("b"));
        let event = next_of(&mut rx, GraphEventKind::Saved).await;
        assert_eq!(event.payload["reason"], "threshold");
        let saved = EntityStore::open(&path, 0.05).await.unwrap();
        assert_eq!(saved.stats().entities, 2);

        // Below threshold: only the shutdown save picks this up
        store.add_entity(corp("c"));
        workers.shutdown().await;
        let saved = EntityStore::open(&path, 0.05).await.unwrap();
        assert_eq!(saved.stats().entities, 3);
    }

    #[tokio::test]
    async fn test_broadcast_on_change() {
        let store = Arc::new(EntityStore::new());
        store.add_entity(corp("a"));
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let token = CancellationToken::new();
        let handle = spawn_broadcast_worker(
            Arc::clone(&store),
            Duration::from_millis(10),
            Duration::from_secs(3600),
            Arc::new(bus.clone()),
            token.clone(),
        );

        let first = next_of(&mut rx, GraphEventKind::Snapshot).await;
        assert_eq!(first.payload["nodes"].as_array().unwrap().len(), 1);

        store.add_entity(corp("b"));
        let second = next_of(&mut rx, GraphEventKind::Snapshot).await;
        assert_eq!(second.payload["nodes"].as_array().unwrap().len(), 2);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_index_worker_repairs_drift() {
        let store = Arc::new(EntityStore::new());
        store
            .add_relationship(CreateRelationship::new("a", "b", RelationshipType::Trade, 0.5))
            .unwrap();
        store.inner.write().graph.adjacency.clear();
        assert!(!store.read(|g| g.adjacency_consistent()));

        let token = CancellationToken::new();
        let handle = spawn_index_worker(Arc::clone(&store), Duration::from_millis(10), token.clone());

        tokio::time::timeout(WAIT, async {
            while !store.read(|g| g.adjacency_consistent()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("adjacency never rebuilt");
        assert_eq!(store.outgoing("a").len(), 1);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_periods_disable_workers() {
        let settings = WorkerSettings {
            decay_interval: Duration::ZERO,
            index_rebuild_interval: Duration::ZERO,
            broadcast_interval: Duration::ZERO,
            autosave: None,
            ..WorkerSettings::default()
        };
        let workers = Workers::start(
            Arc::new(EntityStore::new()),
            Arc::new(EventBus::default()),
            &settings,
        );
        assert!(workers.is_empty());
        workers.shutdown().await;
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config {
            graph_path: PathBuf::from("g.json"),
            decay_lambda: 0.1,
            autosave_path: Some(PathBuf::from("auto.json")),
            autosave_threshold: 7,
            autosave_interval: Duration::from_secs(60),
            workers: crate::WorkersYamlConfig::default(),
            shock: Default::default(),
            log_level: "info".into(),
            log_json: false,
        };
        let settings = WorkerSettings::from(&config);
        assert_eq!(settings.decay_lambda, 0.1);
        assert_eq!(settings.decay_interval, Duration::from_secs(1800));
        assert_eq!(settings.broadcast_heartbeat, Duration::from_secs(30));
        let autosave = settings.autosave.unwrap();
        assert_eq!(autosave.path, PathBuf::from("auto.json"));
        assert_eq!(autosave.threshold, 7);
    }
}
