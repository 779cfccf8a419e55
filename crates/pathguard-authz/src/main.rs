//! CLI entry point for the pathguard permission evaluator.
//!
//! Designed for subprocess invocation: reads a JSON request from stdin and
//! writes a JSON result to stdout. Logs go to stderr.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

use pathguard_authz::{
    load_evaluator_config, preview_rule, validate_rule, InMemoryRuleStore, PermissionEvaluator,
    RuleStore, StaticPermissions,
};
use pathguard_core::config::{load_settings, load_source};
use pathguard_core::schema::Schema;
use pathguard_core::{Catalog, EntityInstance, Subject};
use pathguard_graph::{load_graph_config, GraphClient, GraphQueries};

#[derive(Parser)]
#[command(name = "pathguard-authz")]
#[command(about = "Object permission checks over the pathguard mirror graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: pathguard).
    #[arg(short, long, default_value = "pathguard", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Check one permission (reads {subject, permission, object} JSON from stdin).
    Check,
    /// List reachable object keys for a subject read from stdin.
    Objects {
        /// Permission, `app_label.codename` or `codename`.
        #[arg(long)]
        permission: String,
        /// Target entity kind, `app_label.model_name`.
        #[arg(long)]
        kind: String,
    },
    /// Print the statements a stored rule renders to.
    Preview {
        #[arg(long)]
        rule_id: u64,
    },
    /// Print every relationship type in the graph.
    RelationshipTypes,
}

#[derive(Deserialize)]
struct CheckRequest {
    subject: Subject,
    permission: String,
    object: EntityInstance,
}

/// Input file locations from the `[authz]` section.
#[derive(Deserialize)]
struct AuthzPaths {
    schema_path: String,
    rules_path: String,
    #[serde(default)]
    permissions_path: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let cfg = load_source(&cli.config)?;
    let settings = load_settings(&cfg)?;
    let paths: AuthzPaths = cfg.get("authz")?;

    let catalog = Arc::new(Catalog::new(Schema::from_file(&paths.schema_path)?, &settings));
    let rules = Arc::new(InMemoryRuleStore::from_file(&paths.rules_path)?);
    for rule in rules.rules().await? {
        if let Err(e) = validate_rule(&rule, &catalog) {
            tracing::warn!(rule_id = rule.id, error = %e, "Access rule does not compile");
        }
    }

    match cli.command {
        Command::Preview { rule_id } => {
            let rule = rules
                .rule(rule_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no access rule with id {rule_id}"))?;
            println!("{}", serde_json::to_string(&preview_rule(&rule, &catalog))?);
            return Ok(());
        }
        Command::Check | Command::Objects { .. } | Command::RelationshipTypes => {}
    }

    let graph = Arc::new(GraphClient::connect(&load_graph_config(&cfg)).await?);
    let permissions = match &paths.permissions_path {
        Some(path) => StaticPermissions::from_file(path)?,
        None => StaticPermissions::default(),
    };
    let evaluator = PermissionEvaluator::new(
        catalog,
        graph.clone(),
        rules,
        Arc::new(permissions),
        settings,
    )
    .with_config(load_evaluator_config(&cfg));

    match cli.command {
        Command::Check => {
            let input = std::io::read_to_string(std::io::stdin())?;
            let request: CheckRequest = serde_json::from_str(&input)?;
            let allowed = evaluator
                .checker(request.subject)
                .has_perm(&request.permission, &request.object)
                .await?;
            println!("{}", json!({ "allowed": allowed }));
        }
        Command::Objects { permission, kind } => {
            let input = std::io::read_to_string(std::io::stdin())?;
            let subject: Subject = serde_json::from_str(&input)?;
            let pks = evaluator.checker(subject).objects_for(&permission, &kind).await?;
            println!("{}", json!({ "kind": kind, "pks": pks }));
        }
        Command::RelationshipTypes => {
            println!("{}", serde_json::to_string(&graph.relationship_types().await?)?);
        }
        Command::Preview { .. } => {}
    }

    Ok(())
}
