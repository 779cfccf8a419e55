//! Write statements for the mirror graph.
//!
//! All mutations use MERGE (upsert) semantics so re-syncing a row is
//! idempotent. Mirror nodes are identified by `uid`, a deterministic UUID of
//! `(kind, primary key)`. Each function returns a [`CypherQuery`] to be run
//! in [`QueryMode::Write`](crate::QueryMode::Write).

use chrono::{DateTime, Utc};

use pathguard_core::{EntityInstance, EntityKind, PropertyMap, Value};
use pathguard_cypher::pattern::identifier;

use crate::executor::CypherQuery;
use crate::queries::{META_NODE_TYPE, MODEL_NODE_TYPE};

/// Relationship type linking an instance node to its kind's meta node.
pub const INSTANCE_OF: &str = "INSTANCE_OF";

/// Label of the meta node for a kind label, e.g. `BookMeta`.
pub fn meta_label(label: &str) -> String {
    format!("{label}Meta")
}

/// Create or replace the mirror node of `instance`.
///
/// The node's property set is replaced wholesale, so fields removed from
/// the row disappear from the node.
pub fn upsert_node(
    label: &str,
    instance: &EntityInstance,
    fields: PropertyMap,
    now: DateTime<Utc>,
) -> CypherQuery {
    let uid = instance.uid().to_string();
    let mut props = fields;
    props.insert("uid".to_string(), Value::from(uid.as_str()));
    props.insert("pk".to_string(), Value::Int(instance.pk));
    props.insert("app_label".to_string(), Value::from(instance.app_label()));
    props.insert("model_name".to_string(), Value::from(instance.model_name()));
    props.insert("type".to_string(), Value::from(MODEL_NODE_TYPE));
    props.insert("synced_at".to_string(), Value::from(now.to_rfc3339()));

    CypherQuery::new(format!(
        "MERGE (n:{} {{uid: $uid}})\nSET n = $props",
        identifier(label)
    ))
    .param("uid", uid)
    .map_param("props", props)
}

/// Remove the mirror node of `instance` and all its edges.
pub fn delete_node(label: &str, instance: &EntityInstance) -> CypherQuery {
    CypherQuery::new(format!(
        "MATCH (n:{} {{uid: $uid}})\nDETACH DELETE n",
        identifier(label)
    ))
    .param("uid", instance.uid().to_string())
}

/// Replace every outgoing `rel_type` edge of a node with edges to `targets`.
///
/// Targets that have no mirror node yet are skipped. `target_label` is
/// `None` for relations whose target kind varies per row.
pub fn replace_edges(
    label: &str,
    instance: &EntityInstance,
    rel_type: &str,
    target_label: Option<&str>,
    targets: &[EntityInstance],
    props: PropertyMap,
) -> CypherQuery {
    let rel = identifier(rel_type);
    let target = target_label
        .map(|l| format!(":{}", identifier(l)))
        .unwrap_or_default();
    let target_uids = targets
        .iter()
        .map(|t| Value::from(t.uid().to_string()))
        .collect();

    CypherQuery::new(format!(
        "MATCH (a:{} {{uid: $uid}})\n\
         OPTIONAL MATCH (a)-[old:{rel}]->()\n\
         DELETE old\n\
         WITH DISTINCT a\n\
         UNWIND $targets AS target_uid\n\
         MATCH (b{target} {{uid: target_uid}})\n\
         MERGE (a)-[r:{rel}]->(b)\n\
         SET r = $props",
        identifier(label)
    ))
    .param("uid", instance.uid().to_string())
    .list_param("targets", target_uids)
    .map_param("props", props)
}

/// Create or update the meta node of `kind`.
pub fn upsert_meta_node(kind: &EntityKind) -> CypherQuery {
    let permissions = kind
        .default_permissions()
        .into_iter()
        .map(Value::from)
        .collect();

    CypherQuery::new(format!(
        "MERGE (m:{} {{model: $model}})\n\
         SET m.app_label = $app_label, m.model_name = $model_name,\n\
             m.type = $type, m.default_permissions = $permissions",
        identifier(&meta_label(&kind.label))
    ))
    .param("model", kind.id.as_str())
    .param("app_label", kind.app_label.as_str())
    .param("model_name", kind.model_name.as_str())
    .param("type", META_NODE_TYPE)
    .list_param("permissions", permissions)
}

/// Schema-level edge between two meta nodes.
pub fn connect_meta_nodes(
    source: &EntityKind,
    rel_type: &str,
    target: &EntityKind,
    props: PropertyMap,
) -> CypherQuery {
    CypherQuery::new(format!(
        "MATCH (a:{} {{model: $source}}), (b:{} {{model: $target}})\n\
         MERGE (a)-[r:{}]->(b)\n\
         SET r = $props",
        identifier(&meta_label(&source.label)),
        identifier(&meta_label(&target.label)),
        identifier(rel_type)
    ))
    .param("source", source.id.as_str())
    .param("target", target.id.as_str())
    .map_param("props", props)
}

/// Link an instance node to its kind's meta node.
pub fn connect_instance_to_meta(kind: &EntityKind, instance: &EntityInstance) -> CypherQuery {
    CypherQuery::new(format!(
        "MATCH (n:{} {{uid: $uid}}), (m:{} {{model: $model}})\n\
         MERGE (n)-[:{INSTANCE_OF}]->(m)",
        identifier(&kind.label),
        identifier(&meta_label(&kind.label))
    ))
    .param("uid", instance.uid().to_string())
    .param("model", kind.id.as_str())
}

/// Uniqueness constraint on `uid` for one label.
pub fn unique_uid_constraint(label: &str) -> CypherQuery {
    let name: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    CypherQuery::new(format!(
        "CREATE CONSTRAINT pathguard_{name}_uid IF NOT EXISTS \
         FOR (n:{}) REQUIRE n.uid IS UNIQUE",
        identifier(label)
    ))
}
