//! Read operations against the mirror graph.
//!
//! Available on every [`QueryExecutor`] through the [`GraphQueries`]
//! extension trait, so the same lookups run against Neo4j or the mock.

use std::collections::BTreeMap;

use async_trait::async_trait;

use pathguard_core::{EntityInstance, PropertyMap};
use pathguard_cypher::pattern::identifier;

use crate::error::GraphError;
use crate::executor::{CypherQuery, QueryExecutor, QueryMode};
use crate::row::GraphNode;

/// Node `type` property of mirrored rows.
pub const MODEL_NODE_TYPE: &str = "ModelNode";
/// Node `type` property of per-kind meta nodes.
pub const META_NODE_TYPE: &str = "MetaNode";

/// Look up the mirror node of one row.
pub fn node_for_object_query(label: &str, instance: &EntityInstance) -> CypherQuery {
    CypherQuery::new(format!(
        "MATCH (n:{} {{uid: $uid}}) RETURN n LIMIT 1",
        identifier(label)
    ))
    .param("uid", instance.uid().to_string())
    .returning(["n"])
}

#[async_trait]
pub trait GraphQueries: QueryExecutor {
    /// The mirror node for `instance`, if it has been synced.
    async fn get_node_for_object(
        &self,
        label: &str,
        instance: &EntityInstance,
    ) -> Result<Option<GraphNode>, GraphError> {
        let rows = self
            .run(&node_for_object_query(label, instance), QueryMode::Read)
            .await?;
        Ok(rows.first().and_then(|row| row.node("n")).cloned())
    }

    /// Primary keys of every mirrored row with `label`.
    async fn object_pks(&self, label: &str) -> Result<Vec<i64>, GraphError> {
        let q = CypherQuery::new(format!(
            "MATCH (n:{}) WHERE n.type = $type RETURN n.pk AS pk ORDER BY pk",
            identifier(label)
        ))
        .param("type", MODEL_NODE_TYPE)
        .returning(["pk"]);
        let rows = self.run(&q, QueryMode::Read).await?;
        Ok(rows.iter().filter_map(|row| row.int("pk")).collect())
    }

    /// Every relationship type present in the graph, sorted.
    async fn relationship_types(&self) -> Result<Vec<String>, GraphError> {
        let q = CypherQuery::new(
            "MATCH (n)-[r]-() RETURN DISTINCT type(r) AS rel_type ORDER BY rel_type",
        )
        .returning(["rel_type"]);
        let rows = self.run(&q, QueryMode::Read).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.string("rel_type").map(str::to_string))
            .collect())
    }

    /// Relationship types per node label, optionally restricted to nodes
    /// whose properties equal `filters`.
    async fn node_relationship_types(
        &self,
        filters: &PropertyMap,
    ) -> Result<BTreeMap<String, Vec<String>>, GraphError> {
        let mut q = CypherQuery::new("");
        let mut conditions = Vec::with_capacity(filters.len());
        for (i, (key, value)) in filters.iter().enumerate() {
            let param = format!("p{i}");
            conditions.push(format!("n.{} = ${param}", identifier(key)));
            q = q.param(&param, value.clone());
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        q.text = format!(
            "MATCH (n)-[r]-(){where_clause} RETURN DISTINCT labels(n)[0] AS label, type(r) AS rel_type"
        );
        let q = q.returning(["label", "rel_type"]);

        let mut mapping: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in self.run(&q, QueryMode::Read).await? {
            if let (Some(label), Some(rel_type)) = (row.string("label"), row.string("rel_type")) {
                let types = mapping.entry(label.to_string()).or_default();
                if !types.iter().any(|t| t == rel_type) {
                    types.push(rel_type.to_string());
                }
            }
        }
        for types in mapping.values_mut() {
            types.sort();
        }
        Ok(mapping)
    }

    /// Distinct default permissions declared on meta nodes.
    async fn node_permissions(&self) -> Result<Vec<String>, GraphError> {
        let q = CypherQuery::new(
            "MATCH (n) WHERE n.type = $type UNWIND n.default_permissions AS perm \
             RETURN DISTINCT perm ORDER BY perm",
        )
        .param("type", META_NODE_TYPE)
        .returning(["perm"]);
        let rows = self.run(&q, QueryMode::Read).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.string("perm").map(str::to_string))
            .collect())
    }
}

impl<T: QueryExecutor + ?Sized> GraphQueries for T {}
