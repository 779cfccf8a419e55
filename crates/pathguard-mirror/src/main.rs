//! CLI entry point for bulk mirroring of relational rows.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use pathguard_core::config::{load_settings, load_source};
use pathguard_core::{Catalog, EntityInstance, Schema};
use pathguard_graph::{load_graph_config, GraphClient};
use pathguard_mirror::{
    ensure_constraints, sync_meta_graph, GraphMirror, InMemoryRows, MirrorWriter, SyncReport,
};

#[derive(Parser)]
#[command(name = "pathguard-mirror")]
#[command(about = "Mirror relational rows into the pathguard graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: pathguard).
    #[arg(short, long, default_value = "pathguard", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Sync a JSON array of rows (from a file, or stdin when omitted).
    Import {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Remove one row's mirror node.
    Delete {
        #[arg(long)]
        kind: String,
        #[arg(long)]
        pk: i64,
    },
    /// Write meta nodes and uid constraints for every mirrored kind.
    Meta,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let cfg = load_source(&cli.config)?;
    let settings = load_settings(&cfg)?;
    let schema_path = cfg.get_string("mirror.schema_path")?;
    let catalog = Arc::new(Catalog::new(Schema::from_file(&schema_path)?, &settings));
    let kinds = catalog.warm_up()?;
    tracing::info!(kinds, schema = %schema_path, "Catalog loaded");

    let graph = Arc::new(GraphClient::connect(&load_graph_config(&cfg)).await?);

    match cli.command {
        Command::Import { file } => {
            let input = match &file {
                Some(path) => std::fs::read_to_string(path)?,
                None => std::io::read_to_string(std::io::stdin())?,
            };
            let rows: Vec<EntityInstance> = serde_json::from_str(&input)?;
            let source = Arc::new(InMemoryRows::new(rows.iter().cloned()));
            let mirror = GraphMirror::new(catalog, graph, source, settings);

            let mut report = SyncReport::default();
            for row in &rows {
                report += mirror.upsert(row).await?;
            }
            tracing::info!(rows = rows.len(), synced = report.synced, deleted = report.deleted, "Import complete");
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::Delete { kind, pk } => {
            let source = Arc::new(InMemoryRows::default());
            let mirror = GraphMirror::new(catalog, graph, source, settings);
            let report = mirror.delete(&EntityInstance::new(&kind, pk)).await?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::Meta => {
            let constraints = ensure_constraints(&catalog, graph.as_ref(), &settings).await?;
            let meta_nodes = sync_meta_graph(&catalog, graph.as_ref(), &settings).await?;
            println!(
                "{}",
                serde_json::json!({ "constraints": constraints, "meta_nodes": meta_nodes })
            );
        }
    }

    Ok(())
}
