//! EconGraph - command line
//!
//! Inspect and mutate a persisted economic graph, simulate shocks, and run the
//! background maintenance workers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use econgraph::events::GraphEventKind;
use econgraph::graph::{
    directionality, CreateRelationship, Directionality, EdgeKey, Entity, EntityCategory,
    RelationshipType,
};
use econgraph::simulation::{ShockEvent, Stage};
use econgraph::workers::{WorkerSettings, Workers};
use econgraph::{AppState, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "econgraph")]
#[command(about = "Economic knowledge graph with supply-shock simulation")]
struct Cli {
    /// YAML config file (defaults to ./config.yaml)
    #[arg(short, long, global = true, env = "ECONGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Graph document to operate on (overrides config.yaml)
    #[arg(short, long, global = true)]
    graph: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Dot,
}

#[derive(Subcommand)]
enum Commands {
    /// Print graph statistics and entities
    Show {
        /// List edges as well
        #[arg(long)]
        edges: bool,
    },

    /// Print the propagation rule of every relationship type
    Rules,

    /// Insert or overwrite an entity
    AddEntity {
        id: String,
        category: EntityCategory,
        name: String,
        #[arg(long)]
        health: Option<f64>,
        #[arg(long)]
        ticker: Option<String>,
    },

    /// Append a relationship
    AddEdge {
        source: String,
        target: String,
        /// Relationship type, e.g. Supplies or DependsOn
        kind: String,
        weight: f64,
        /// downstream, upstream or both (defaults to the type's rule)
        #[arg(long, value_parser = parse_directionality)]
        directionality: Option<Directionality>,
    },

    /// Blend new evidence into an edge weight
    UpdateWeight {
        source: String,
        target: String,
        kind: String,
        #[arg(long, allow_hyphen_values = true)]
        sentiment: f64,
        #[arg(long, default_value = "1.0")]
        relevance: f64,
        #[arg(long, default_value = "manual")]
        event_id: String,
    },

    /// Record a market price for an entity
    SetPrice {
        id: String,
        price: f64,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long)]
        ticker: Option<String>,
    },

    /// Simulate a supply shock on an entity
    Shock {
        target: String,
        /// Remaining flow: 1.0 = no disruption, 0.0 = total stoppage
        #[arg(long, default_value = "0.5")]
        impact: f64,
        #[arg(long, default_value = "Supply shock")]
        description: String,
        /// Print the plan without applying it
        #[arg(long)]
        dry_run: bool,
    },

    /// Run one decay sweep over every edge
    Decay {
        /// Decay rate per day (defaults to config)
        #[arg(long)]
        lambda: Option<f64>,
    },

    /// Assign directionality to edges that lack one and report the result
    Migrate,

    /// Derive Supplies/ProcuresFrom edges from DependsOn between companies
    Discover,

    /// Suppliers, clients, raw materials and products of a company
    Relations { company: String },

    /// List every corporation
    Companies,

    /// Print the weight history of an edge
    History {
        source: String,
        target: String,
        kind: String,
    },

    /// Export the graph as node/link JSON or Graphviz DOT
    Export {
        #[arg(value_enum)]
        format: ExportFormat,
        /// Output file (stdout when omitted)
        output: Option<PathBuf>,
    },

    /// Run the background workers until Ctrl-C
    Serve,
}

fn parse_directionality(raw: &str) -> std::result::Result<Directionality, String> {
    match raw.to_ascii_lowercase().as_str() {
        "downstream" | "unidirectional" => Ok(Directionality::Downstream),
        "upstream" | "reverse" => Ok(Directionality::Upstream),
        "both" | "bidirectional" => Ok(Directionality::Both),
        _ => Err(format!("unknown directionality: {raw}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;
    if let Some(path) = cli.graph {
        config.graph_path = path;
    }

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.as_str().into());
    let (plain, json) = if config.log_json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();

    let state = AppState::new(config).await?;
    run(cli.command, state).await
}

async fn run(command: Commands, state: AppState) -> Result<()> {
    let store = &state.store;

    match command {
        Commands::Show { edges } => {
            println!("{}", store.stats());
            let mut entities = store.all_entities();
            entities.sort_by(|a, b| a.id.cmp(&b.id));
            for e in &entities {
                println!(
                    "  {:<24} {:<12} health={:.2}  {}",
                    e.id, e.category, e.health, e.name
                );
            }
            if edges {
                for edge in store.all_edges() {
                    let mode = directionality::effective_directionality(&edge);
                    println!(
                        "  {} -[{}]-> {}  w={:.3} {} {}",
                        edge.source,
                        edge.kind,
                        edge.target,
                        edge.weight,
                        edge.status,
                        directionality::arrow(mode)
                    );
                }
            }
        }

        Commands::Rules => {
            for kind in RelationshipType::KNOWN.iter() {
                println!("  {:<14} {}", kind, directionality::describe(kind));
            }
        }

        Commands::AddEntity {
            id,
            category,
            name,
            health,
            ticker,
        } => {
            let mut entity = Entity::new(id.clone(), category, name);
            if let Some(h) = health {
                entity = entity.with_health(h);
            }
            if let Some(t) = ticker {
                entity = entity.with_ticker(t);
            }
            store.add_entity(entity);
            state.save().await?;
            println!("Entity {id} saved");
        }

        Commands::AddEdge {
            source,
            target,
            kind,
            weight,
            directionality,
        } => {
            let mut request =
                CreateRelationship::new(source, target, RelationshipType::from_name(&kind), weight);
            if let Some(mode) = directionality {
                request = request.with_directionality(mode);
            }
            let edge = store.add_relationship(request)?;
            state.save().await?;
            println!(
                "Added {} -[{}]-> {} (w={:.3})",
                edge.source, edge.kind, edge.target, edge.weight
            );
        }

        Commands::UpdateWeight {
            source,
            target,
            kind,
            sentiment,
            relevance,
            event_id,
        } => {
            let kind = RelationshipType::from_name(&kind);
            let edge =
                store.update_weight(&source, &target, &kind, sentiment, relevance, &event_id)?;
            state.save().await?;
            println!(
                "{source} -[{kind}]-> {target} now {:.3} ({})",
                edge.weight, edge.status
            );
        }

        Commands::SetPrice {
            id,
            price,
            currency,
            ticker,
        } => {
            store.update_price(&id, price, &currency, ticker.as_deref())?;
            state.save().await?;
            println!("{id}: {price} {currency}");
        }

        Commands::Shock {
            target,
            impact,
            description,
            dry_run,
        } => {
            let event = ShockEvent::new(target, description, impact);
            if dry_run {
                let plan = state.propagator.preview(&event)?;
                println!(
                    "Shock on {}: effective impact {:.3} (resilience {:.2})",
                    plan.event.target, plan.effective_impact, plan.resilience
                );
                for stage in [
                    Stage::Target,
                    Stage::Downstream,
                    Stage::Upstream,
                    Stage::Winner,
                    Stage::SecondOrder,
                ] {
                    println!("  {:?}: {} mutations", stage, plan.count(stage));
                }
                println!("  Directly impacted: {}", plan.directly_impacted.join(", "));
                println!("  Winners: {}", plan.winners.join(", "));
            } else {
                let report = state.propagator.run(&event)?;
                state.save().await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }

        Commands::Decay { lambda } => {
            let lambda = lambda.unwrap_or(state.config.decay_lambda);
            let updated = store.apply_decay_to_all(lambda)?;
            state.save().await?;
            println!("Decayed {updated} edges (lambda={lambda})");
        }

        Commands::Migrate => {
            let migrated = store.migrate_directionality();
            if migrated > 0 {
                state.save().await?;
            }
            println!("Migrated {migrated} edges");
            println!("{}", store.directionality_report());
            let unresolved = store.validate_directionality();
            if !unresolved.is_empty() {
                println!("Unresolved edges:");
                for line in unresolved {
                    println!("  {line}");
                }
            }
        }

        Commands::Discover => {
            let created = store.discover_supply_chain();
            if created > 0 {
                state.save().await?;
            }
            println!("Created {created} supply-chain edges");
        }

        Commands::Relations { company } => {
            let relations = store.company_relations(&company)?;
            println!("{}", serde_json::to_string_pretty(&relations)?);
        }

        Commands::Companies => {
            for c in store.companies() {
                let ticker = c.ticker.as_deref().unwrap_or("-");
                println!("  {:<24} {:<8} {}", c.id, ticker, c.name);
            }
        }

        Commands::History {
            source,
            target,
            kind,
        } => {
            let key = EdgeKey::new(source, target, RelationshipType::from_name(&kind));
            let history = store
                .history(&key)
                .with_context(|| format!("no history for {key}"))?;
            for snap in &history.history {
                println!(
                    "  {}  w={:.3} {:<8} {}",
                    snap.timestamp.to_rfc3339(),
                    snap.weight,
                    snap.status,
                    snap.event_id.as_deref().unwrap_or("")
                );
            }
        }

        Commands::Export { format, output } => {
            let rendered = match format {
                ExportFormat::Json => store.to_json()?,
                ExportFormat::Dot => store.to_dot(),
            };
            match output {
                Some(path) => {
                    tokio::fs::write(&path, rendered)
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Exported to {}", path.display());
                }
                None => println!("{rendered}"),
            }
        }

        Commands::Serve => serve(state).await?,
    }

    Ok(())
}

async fn serve(state: AppState) -> Result<()> {
    let settings = WorkerSettings::from(state.config.as_ref());
    let workers = Workers::start(
        Arc::clone(&state.store),
        Arc::new(state.events.clone()),
        &settings,
    );

    // Mirror maintenance events into the log
    let mut rx = state.events.subscribe();
    let token = workers.token();
    let logger = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = rx.recv() => match event {
                    Ok(event) if event.kind == GraphEventKind::Snapshot => {
                        tracing::debug!(timestamp = %event.timestamp, "Snapshot published");
                    }
                    Ok(event) => tracing::info!(kind = ?event.kind, payload = %event.payload, "Graph event"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Event logger lagged");
                    }
                    Err(_) => break,
                },
            }
        }
    });

    tracing::info!(graph = %state.config.graph_path.display(), "{}", state.store.stats());
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    workers.shutdown().await;
    logger.await.ok();
    Ok(())
}
