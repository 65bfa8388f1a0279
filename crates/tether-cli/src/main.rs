#![deny(unsafe_code)]

//! Tether CLI: inspect the association hierarchy and tags, build relationship
//! queries, compute stats and run the handshake against a JSON snapshot.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tether_config::AppConfig;
use tether_core::keyword::{self, AssociationTag};
use tether_core::{
    Associations, Entity, EntityType, MemoryBackend, RelationshipView, SearchEngine,
    ServiceContext, Snapshot,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Tether: two-sided parent/child associations between records.
#[derive(Parser)]
#[command(name = "tether", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "tether.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },

    /// Show the declared hierarchy of an entity type.
    Hierarchy { entity_type: String },

    /// Check whether two entity types may associate.
    Supported { a: EntityType, b: EntityType },

    /// Decode association tags.
    Tags {
        #[command(subcommand)]
        command: TagsCommand,
    },

    /// Build one relationship view of an entity.
    Query {
        #[command(flatten)]
        target: SnapshotTarget,
        #[arg(long)]
        view: RelationshipView,
        /// Also run the query against the snapshot.
        #[arg(long)]
        execute: bool,
    },

    /// Count an entity's relationships.
    Stats {
        #[command(flatten)]
        target: SnapshotTarget,
    },

    /// Write this entity's half of an association.
    Request(ProtocolArgs),

    /// Write this entity's half of an association the other side started.
    Accept(ProtocolArgs),

    /// Remove this entity's half of an association.
    Break(ProtocolArgs),
}

#[derive(Subcommand)]
enum TagsCommand {
    /// Parse tags in either grammar.
    Parse { tags: Vec<String> },

    /// Ids named by reference tags.
    Ids {
        /// Restrict to one association type.
        #[arg(long = "type")]
        entity_type: Option<EntityType>,
        tags: Vec<String>,
    },
}

#[derive(clap::Args)]
struct SnapshotTarget {
    /// JSON snapshot of entities and groups.
    #[arg(long)]
    snapshot: PathBuf,
    /// The acting entity, as `type:id`.
    #[arg(long)]
    entity: EntitySpec,
    /// The association type to look at.
    #[arg(long)]
    association: EntityType,
}

#[derive(clap::Args)]
struct ProtocolArgs {
    /// JSON snapshot of entities and groups; rewritten on success.
    #[arg(long)]
    snapshot: PathBuf,
    /// The acting entity, as `type:id`.
    #[arg(long)]
    entity: EntitySpec,
    /// The counterpart, as `type:id`.
    #[arg(long)]
    target: EntitySpec,
}

/// A `type:id` pair on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EntitySpec {
    entity_type: EntityType,
    id: String,
}

impl FromStr for EntitySpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (type_name, id) = s
            .split_once(':')
            .ok_or_else(|| format!("expected `type:id`, got '{s}'"))?;
        if id.is_empty() {
            return Err(format!("missing id in '{s}'"));
        }
        let entity_type = type_name.parse().map_err(|e| format!("{e}"))?;
        Ok(Self {
            entity_type,
            id: id.to_string(),
        })
    }
}

impl fmt::Display for EntitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtocolOp {
    Request,
    Accept,
    Break,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let output = match cli.command {
        Commands::Config { show } => cmd_config(&cli.config, show).await?,
        Commands::Hierarchy { entity_type } => cmd_hierarchy(&cli.config, &entity_type).await?,
        Commands::Supported { a, b } => cmd_supported(&cli.config, a, b).await?,
        Commands::Tags { command } => cmd_tags(command)?,
        Commands::Query {
            target,
            view,
            execute,
        } => cmd_query(&cli.config, &target, view, execute).await?,
        Commands::Stats { target } => cmd_stats(&cli.config, &target).await?,
        Commands::Request(args) => cmd_protocol(&cli.config, &args, ProtocolOp::Request).await?,
        Commands::Accept(args) => cmd_protocol(&cli.config, &args, ProtocolOp::Accept).await?,
        Commands::Break(args) => cmd_protocol(&cli.config, &args, ProtocolOp::Break).await?,
    };
    println!("{output}");

    Ok(())
}

async fn cmd_config(config_path: &Path, show: bool) -> Result<String> {
    let config = load_config(config_path).await?;
    if show {
        toml::to_string_pretty(&config).context("failed to render configuration")
    } else {
        Ok(format!("Configuration at '{}' is valid.", config_path.display()))
    }
}

async fn cmd_hierarchy(config_path: &Path, entity_type: &str) -> Result<String> {
    let engine = load_engine(config_path).await?;
    let hierarchy = engine.registry().lookup_name(entity_type)?;
    let join = |types: &[EntityType]| {
        types
            .iter()
            .map(EntityType::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    Ok(format!(
        "children: {}\nparents: {}",
        join(&hierarchy.children),
        join(&hierarchy.parents)
    ))
}

async fn cmd_supported(config_path: &Path, a: EntityType, b: EntityType) -> Result<String> {
    let engine = load_engine(config_path).await?;
    Ok(engine.is_supported(a, b)?.to_string())
}

fn cmd_tags(command: TagsCommand) -> Result<String> {
    let lines: Vec<String> = match command {
        TagsCommand::Parse { tags } => tags
            .iter()
            .map(|tag| match AssociationTag::parse(tag) {
                Some(parsed) => format!(
                    "{tag}\t{:?}\t{}\t{}",
                    parsed.kind, parsed.entity_type, parsed.id
                ),
                None => format!("{tag}\t-"),
            })
            .collect(),
        TagsCommand::Ids { entity_type, tags } => keyword::extract_ids(&tags, entity_type),
    };
    Ok(lines.join("\n"))
}

async fn cmd_query(
    config_path: &Path,
    target: &SnapshotTarget,
    view: RelationshipView,
    execute: bool,
) -> Result<String> {
    let engine = load_engine(config_path).await?;
    let (backend, ctx) = open_snapshot(&target.snapshot).await?;
    let entity = find_entity(&backend, &target.entity)?;

    let query = engine
        .build_relationship_query(&entity, target.association, view, &ctx)
        .await?;
    let Some(query) = query else {
        return Ok("none".to_string());
    };

    let mut output = serde_json::to_string_pretty(&query)?;
    if execute {
        let response = backend.execute(&query).await?;
        let ids: Vec<&str> = response.results.iter().map(|e| e.id.as_str()).collect();
        output.push_str(&format!("\ntotal: {} [{}]", response.total, ids.join(", ")));
    }
    Ok(output)
}

async fn cmd_stats(config_path: &Path, target: &SnapshotTarget) -> Result<String> {
    let engine = load_engine(config_path).await?;
    let (backend, ctx) = open_snapshot(&target.snapshot).await?;
    let entity = find_entity(&backend, &target.entity)?;

    let stats = engine.get_stats(&entity, target.association, &ctx).await?;
    Ok(serde_json::to_string_pretty(&stats)?)
}

async fn cmd_protocol(config_path: &Path, args: &ProtocolArgs, op: ProtocolOp) -> Result<String> {
    let engine = load_engine(config_path).await?;
    let (backend, ctx) = open_snapshot(&args.snapshot).await?;
    let mut entity = find_entity(&backend, &args.entity)?;
    let (association_type, id) = (args.target.entity_type, args.target.id.as_str());

    match op {
        ProtocolOp::Request => {
            engine
                .request_association(&mut entity, association_type, id, &ctx)
                .await?
        }
        ProtocolOp::Accept => {
            engine
                .accept_association(&mut entity, association_type, id, &ctx)
                .await?
        }
        ProtocolOp::Break => {
            engine
                .break_association(&mut entity, association_type, id, &ctx)
                .await?
        }
    }

    backend.snapshot().save(&args.snapshot).await?;
    info!(
        entity = %args.entity,
        target = %args.target,
        op = ?op,
        "Snapshot updated"
    );
    Ok(format!("{op:?}: {} -> {}", args.entity, args.target))
}

async fn open_snapshot(path: &Path) -> Result<(Arc<MemoryBackend>, ServiceContext)> {
    let snapshot = Snapshot::load(path).await?;
    let backend = Arc::new(MemoryBackend::new(snapshot));
    let ctx = ServiceContext::from_backend(backend.clone());
    Ok((backend, ctx))
}

fn find_entity(backend: &MemoryBackend, spec: &EntitySpec) -> Result<Entity> {
    match backend.entity(spec.entity_type, &spec.id) {
        Some(entity) => Ok(entity),
        None => bail!("{spec} is not in the snapshot"),
    }
}

async fn load_engine(path: &Path) -> Result<Associations> {
    let config = load_config(path).await?;
    Ok(Associations::from_config(&config)?)
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        Ok(AppConfig::load(path).await?)
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(AppConfig::default())
    }
}
