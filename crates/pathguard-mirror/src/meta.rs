//! Schema-level graph: one meta node per kind and uid constraints.

use pathguard_core::{Catalog, Settings};
use pathguard_graph::mutations::{connect_meta_nodes, unique_uid_constraint, upsert_meta_node};
use pathguard_graph::{QueryExecutor, QueryMode};

use crate::error::Result;

/// Write a meta node per mirrored kind and an edge per typed relationship.
///
/// Returns the number of meta nodes written.
pub async fn sync_meta_graph(
    catalog: &Catalog,
    executor: &dyn QueryExecutor,
    settings: &Settings,
) -> Result<usize> {
    let mut kinds = Vec::new();
    for id in catalog.kind_ids() {
        if settings.is_ignored(&id) {
            continue;
        }
        let kind = catalog.kind(&id)?;
        executor.run(&upsert_meta_node(&kind), QueryMode::Write).await?;
        kinds.push(kind);
    }

    let mut edges = 0;
    for kind in &kinds {
        for relation in &kind.relationships {
            let Some(target) = relation.target.as_deref() else {
                continue;
            };
            if settings.is_ignored(target) {
                continue;
            }
            let target = catalog.kind(target)?;
            let query = connect_meta_nodes(
                kind,
                &relation.rel_type,
                &target,
                relation.default_properties(),
            );
            executor.run(&query, QueryMode::Write).await?;
            edges += 1;
        }
    }

    tracing::info!(kinds = kinds.len(), edges, "Meta graph synced");
    Ok(kinds.len())
}

/// Create the `uid` uniqueness constraint for every mirrored label.
pub async fn ensure_constraints(
    catalog: &Catalog,
    executor: &dyn QueryExecutor,
    settings: &Settings,
) -> Result<usize> {
    let mut created = 0;
    for id in catalog.kind_ids() {
        if settings.is_ignored(&id) {
            continue;
        }
        let kind = catalog.kind(&id)?;
        executor
            .run(&unique_uid_constraint(&kind.label), QueryMode::Write)
            .await?;
        created += 1;
    }
    Ok(created)
}
