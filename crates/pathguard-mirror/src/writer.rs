//! Row-to-graph synchronisation.

use std::collections::{HashMap, HashSet};
use std::ops::AddAssign;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use pathguard_core::{Catalog, EntityInstance, EntityKind, PropertyMap, RelationshipField, Settings, Value};
use pathguard_graph::mutations::{connect_instance_to_meta, delete_node, replace_edges, upsert_node};
use pathguard_graph::{CypherQuery, QueryExecutor, QueryMode};

use crate::error::Result;

/// Counts of mirror writes for one or more rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    pub deleted: usize,
    pub skipped: usize,
}

impl AddAssign for SyncReport {
    fn add_assign(&mut self, other: Self) {
        self.synced += other.synced;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
    }
}

/// Called by the persistence layer after a row is saved or deleted.
#[async_trait]
pub trait MirrorWriter: Send + Sync {
    async fn upsert(&self, instance: &EntityInstance) -> Result<SyncReport>;

    async fn delete(&self, instance: &EntityInstance) -> Result<SyncReport>;
}

/// Reads current rows so related rows can be re-synced.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn fetch(&self, kind: &str, pk: i64) -> Result<Option<EntityInstance>>;
}

/// Rows held in memory, keyed by kind and primary key.
#[derive(Debug, Default)]
pub struct InMemoryRows {
    rows: HashMap<(String, i64), EntityInstance>,
}

impl InMemoryRows {
    pub fn new(rows: impl IntoIterator<Item = EntityInstance>) -> Self {
        let mut source = Self::default();
        for row in rows {
            source.insert(row);
        }
        source
    }

    pub fn insert(&mut self, row: EntityInstance) {
        self.rows.insert((row.kind.to_lowercase(), row.pk), row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl RowSource for InMemoryRows {
    async fn fetch(&self, kind: &str, pk: i64) -> Result<Option<EntityInstance>> {
        Ok(self.rows.get(&(kind.to_lowercase(), pk)).cloned())
    }
}

/// [`MirrorWriter`] backed by a graph [`QueryExecutor`].
pub struct GraphMirror {
    catalog: Arc<Catalog>,
    executor: Arc<dyn QueryExecutor>,
    rows: Arc<dyn RowSource>,
    settings: Settings,
}

impl GraphMirror {
    pub fn new(
        catalog: Arc<Catalog>,
        executor: Arc<dyn QueryExecutor>,
        rows: Arc<dyn RowSource>,
        settings: Settings,
    ) -> Self {
        Self {
            catalog,
            executor,
            rows,
            settings,
        }
    }

    async fn write(&self, query: &CypherQuery) -> Result<()> {
        self.executor.run(query, QueryMode::Write).await?;
        Ok(())
    }

    async fn write_node(&self, kind: &EntityKind, row: &EntityInstance, now: DateTime<Utc>) -> Result<()> {
        let mut fields = PropertyMap::new();
        for (name, value) in &row.fields {
            match kind.scalar_fields.get(name) {
                Some(scalar) if scalar.accepts(value) => {
                    fields.insert(name.clone(), value.clone());
                }
                Some(scalar) => tracing::warn!(
                    %row, field = %name, expected = %scalar, found = value.type_name(),
                    "Dropping mistyped field"
                ),
                None => {}
            }
        }

        self.write(&upsert_node(&kind.label, row, fields, now)).await?;
        if self.settings.connect_meta_nodes {
            self.write(&connect_instance_to_meta(kind, row)).await?;
        }
        Ok(())
    }

    async fn write_edges(&self, kind: &EntityKind, row: &EntityInstance) -> Result<()> {
        for relation in &kind.relationships {
            let Some(mut targets) = targets(relation, row) else {
                continue;
            };
            targets.retain(|t| !self.settings.is_ignored(&t.kind));
            let target_label = match &relation.target {
                Some(target) => Some(self.catalog.kind(target)?.label.clone()),
                None => None,
            };

            let query = replace_edges(
                &kind.label,
                row,
                &relation.rel_type,
                target_label.as_deref(),
                &targets,
                relation.default_properties(),
            );
            self.write(&query).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MirrorWriter for GraphMirror {
    /// Mirror `instance` and, up to `max_connection_depth` hops away, the
    /// rows it relates to. Nodes are written before edges so every edge
    /// finds both ends.
    async fn upsert(&self, instance: &EntityInstance) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        if !self.settings.enabled {
            report.skipped += 1;
            return Ok(report);
        }
        if self.settings.is_ignored(&instance.kind) {
            tracing::debug!(row = %instance, "Ignored kind, removing mirror node");
            return self.delete(instance).await;
        }

        let now = Utc::now();
        let max_depth = self.settings.max_connection_depth;
        let mut visited = HashSet::from([(instance.kind.clone(), instance.pk)]);
        let mut frontier = vec![instance.clone()];
        let mut written: Vec<(Arc<EntityKind>, EntityInstance)> = Vec::new();

        for depth in 0..=max_depth {
            let mut next = Vec::new();
            for row in frontier {
                let kind = self.catalog.kind(&row.kind)?;
                self.write_node(&kind, &row, now).await?;

                if depth < max_depth {
                    for relation in &kind.relationships {
                        for target in targets(relation, &row).unwrap_or_default() {
                            if self.settings.is_ignored(&target.kind)
                                || !visited.insert((target.kind.clone(), target.pk))
                            {
                                continue;
                            }
                            match self.rows.fetch(&target.kind, target.pk).await? {
                                Some(found) => next.push(found),
                                None => tracing::debug!(row = %target, "Related row not found"),
                            }
                        }
                    }
                }
                written.push((kind, row));
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        for (kind, row) in &written {
            self.write_edges(kind, row).await?;
        }
        report.synced = written.len();
        tracing::debug!(row = %instance, synced = report.synced, "Mirrored row");
        Ok(report)
    }

    async fn delete(&self, instance: &EntityInstance) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        if !self.settings.enabled {
            report.skipped += 1;
            return Ok(report);
        }
        let kind = self.catalog.kind(&instance.kind)?;
        self.write(&delete_node(&kind.label, instance)).await?;
        report.deleted += 1;
        Ok(report)
    }
}

/// Current targets of `relation` on `row`, or `None` when the row does not
/// carry that relation.
///
/// Generic relations read the target kind from the `<name>_kind` field.
fn targets(relation: &RelationshipField, row: &EntityInstance) -> Option<Vec<EntityInstance>> {
    let pks = row.relations.get(&relation.name)?;
    let kind = match &relation.target {
        Some(kind) => kind.clone(),
        None => row
            .fields
            .get(&format!("{}_kind", relation.name))
            .and_then(Value::as_str)?
            .to_lowercase(),
    };
    Some(pks.iter().map(|pk| EntityInstance::new(&kind, *pk)).collect())
}

#[cfg(test)]
mod tests {
    use pathguard_core::Schema;
    use pathguard_graph::mock::MockExecutor;
    use pathguard_graph::Param;

    use super::*;

    const BOOKSTORE: &str = include_str!("../../../fixtures/bookstore.json");

    fn mirror(mock: &Arc<MockExecutor>, rows: InMemoryRows, settings: Settings) -> GraphMirror {
        let catalog = Arc::new(Catalog::new(Schema::from_json(BOOKSTORE).unwrap(), &settings));
        GraphMirror::new(catalog, mock.clone(), Arc::new(rows), settings)
    }

    fn book() -> EntityInstance {
        EntityInstance::new("testapp.book", 1)
            .with_field("name", "Dune")
            .with_field("pages", 412)
            .with_relation("authors", &[10])
            .with_relation("publisher", &[3])
    }

    fn related_rows() -> InMemoryRows {
        InMemoryRows::new([
            EntityInstance::new("testapp.author", 10)
                .with_field("name", "Frank")
                .with_relation("book", &[1])
                .with_relation("user", &[7]),
            EntityInstance::new("testapp.publisher", 3).with_relation("book", &[1]),
            EntityInstance::new("auth.user", 7).with_relation("groups", &[2]),
            EntityInstance::new("auth.group", 2),
        ])
    }

    #[tokio::test]
    async fn row_kinds_match_case_insensitively() {
        let rows: Vec<EntityInstance> = serde_json::from_str(
            r#"[{"kind": "testapp.Book", "pk": 1}, {"kind": "TestApp.Author", "pk": 10}]"#,
        )
        .unwrap();
        let mut source = InMemoryRows::new(rows);
        source.insert(EntityInstance {
            kind: "testapp.Store".to_string(),
            ..EntityInstance::new("testapp.store", 5)
        });

        assert!(source.fetch("testapp.book", 1).await.unwrap().is_some());
        assert!(source.fetch("testapp.author", 10).await.unwrap().is_some());
        assert!(source.fetch("testapp.STORE", 5).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ignored_kind_is_deleted_not_merged() {
        let mock = Arc::new(MockExecutor::empty());
        let settings = Settings {
            ignore_models: vec!["auth.*".to_string()],
            ..Settings::default()
        };
        let mirror = mirror(&mock, InMemoryRows::default(), settings);

        let report = mirror.upsert(&EntityInstance::new("auth.group", 2)).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(mock.texts_containing("MERGE").is_empty());
        assert_eq!(mock.texts_containing("DETACH DELETE").len(), 1);

        let report = mirror.upsert(&EntityInstance::new("testapp.book", 1)).await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(mock.texts_containing("MERGE (n:Book {uid: $uid})").len(), 1);
    }

    #[tokio::test]
    async fn disabled_mirror_writes_nothing() {
        let mock = Arc::new(MockExecutor::empty());
        let settings = Settings {
            enabled: false,
            ..Settings::default()
        };
        let mirror = mirror(&mock, related_rows(), settings);
        assert_eq!(mirror.upsert(&book()).await.unwrap().skipped, 1);
        assert_eq!(mirror.delete(&book()).await.unwrap().skipped, 1);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn related_rows_follow_connection_depth() {
        for (depth, expected) in [(0, 1), (1, 3), (2, 4), (5, 5)] {
            let mock = Arc::new(MockExecutor::empty());
            let settings = Settings {
                max_connection_depth: depth,
                ..Settings::default()
            };
            let report = mirror(&mock, related_rows(), settings)
                .upsert(&book())
                .await
                .unwrap();
            assert_eq!(report.synced, expected, "depth {depth}");
            assert_eq!(mock.texts_containing("SET n = $props").len(), expected);
        }
    }

    #[tokio::test]
    async fn nodes_are_written_before_edges() {
        let mock = Arc::new(MockExecutor::empty());
        mirror(&mock, related_rows(), Settings::default())
            .upsert(&book())
            .await
            .unwrap();

        let calls = mock.calls();
        let last_node = calls.iter().rposition(|(_, q)| q.text.contains("SET n = $props")).unwrap();
        let first_edge = calls.iter().position(|(_, q)| q.text.contains("UNWIND $targets")).unwrap();
        assert!(last_node < first_edge);
        assert!(calls.iter().all(|(mode, _)| *mode == QueryMode::Write));
    }

    #[tokio::test]
    async fn edges_carry_targets_and_default_properties() {
        let mock = Arc::new(MockExecutor::empty());
        let settings = Settings {
            max_connection_depth: 0,
            ..Settings::default()
        };
        mirror(&mock, InMemoryRows::default(), settings)
            .upsert(&book())
            .await
            .unwrap();

        let calls = mock.calls();
        let (_, authors) = calls
            .iter()
            .find(|(_, q)| q.text.contains("[old:AUTHORS]"))
            .unwrap();
        assert!(authors.text.contains("MATCH (b:Author {uid: target_uid})"));
        assert_eq!(
            authors.params["targets"],
            Param::List(vec![Value::from(
                EntityInstance::new("testapp.author", 10).uid().to_string()
            )])
        );
        let Param::Map(props) = &authors.params["props"] else {
            panic!("props must be a map");
        };
        assert_eq!(props["remote_field"], Value::from("testapp.book.authors"));
        assert_eq!(props["target_field"], Value::from("testapp.author.pk"));

        // Relations absent from the row leave existing edges alone.
        assert!(mock.texts_containing("[old:STORE]").is_empty());
    }

    #[tokio::test]
    async fn only_declared_well_typed_fields_are_stored() {
        let mock = Arc::new(MockExecutor::empty());
        let row = EntityInstance::new("testapp.book", 1)
            .with_field("name", "Dune")
            .with_field("pages", "many")
            .with_field("internal_note", "x");
        mirror(&mock, InMemoryRows::default(), Settings::default())
            .upsert(&row)
            .await
            .unwrap();

        let calls = mock.calls();
        let Param::Map(props) = &calls[0].1.params["props"] else {
            panic!("props must be a map");
        };
        assert_eq!(props["name"], Value::from("Dune"));
        assert!(!props.contains_key("pages"));
        assert!(!props.contains_key("internal_note"));
    }

    #[tokio::test]
    async fn generic_relations_read_target_kind_from_row() {
        let mock = Arc::new(MockExecutor::empty());
        let tag = EntityInstance::new("testapp.tag", 4)
            .with_field("content_object_kind", "testapp.book")
            .with_relation("content_object", &[1]);
        let settings = Settings {
            max_connection_depth: 0,
            ..Settings::default()
        };
        mirror(&mock, InMemoryRows::default(), settings)
            .upsert(&tag)
            .await
            .unwrap();

        let edges = mock.texts_containing("[old:CONTENT_OBJECT]");
        assert_eq!(edges.len(), 1);
        assert!(edges[0].contains("MATCH (b {uid: target_uid})"));
    }

    #[tokio::test]
    async fn meta_edges_when_enabled() {
        let mock = Arc::new(MockExecutor::empty());
        let settings = Settings {
            connect_meta_nodes: true,
            max_connection_depth: 0,
            ..Settings::default()
        };
        mirror(&mock, InMemoryRows::default(), settings)
            .upsert(&book())
            .await
            .unwrap();
        assert_eq!(mock.texts_containing("MERGE (n)-[:INSTANCE_OF]->(m)").len(), 1);
    }

    #[tokio::test]
    async fn delete_detaches_node() {
        let mock = Arc::new(MockExecutor::empty());
        let report = mirror(&mock, InMemoryRows::default(), Settings::default())
            .delete(&book())
            .await
            .unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(mock.texts_containing("MATCH (n:Book {uid: $uid})\nDETACH DELETE n").len(), 1);
    }
}
