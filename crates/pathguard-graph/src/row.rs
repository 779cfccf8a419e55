//! Driver-independent result rows.
//!
//! Rows returned by a [`QueryExecutor`](crate::QueryExecutor) are converted
//! into these types so callers (and the in-memory mock) never handle
//! `neo4rs` values directly.

use std::collections::BTreeMap;

use pathguard_core::{PropertyMap, Value};

/// A node as returned by the graph store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphNode {
    /// Store-internal node id.
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: PropertyMap,
}

impl GraphNode {
    pub fn new(id: i64, label: &str) -> Self {
        Self {
            id,
            labels: vec![label.to_string()],
            properties: PropertyMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Primary key of the mirrored row.
    pub fn pk(&self) -> Option<i64> {
        self.property("pk").and_then(Value::as_i64)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// A relationship inside a returned path.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRelation {
    pub id: i64,
    pub rel_type: String,
    pub properties: PropertyMap,
}

/// An alternating node/relationship sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphPath {
    pub nodes: Vec<GraphNode>,
    pub relations: Vec<GraphRelation>,
}

impl GraphPath {
    pub fn start(&self) -> Option<&GraphNode> {
        self.nodes.first()
    }

    pub fn end(&self) -> Option<&GraphNode> {
        self.nodes.last()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphValue {
    Null,
    Scalar(Value),
    List(Vec<GraphValue>),
    Node(GraphNode),
    Relation(GraphRelation),
    Path(GraphPath),
}

impl From<Value> for GraphValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            other => Self::Scalar(other),
        }
    }
}

impl From<GraphNode> for GraphValue {
    fn from(node: GraphNode) -> Self {
        Self::Node(node)
    }
}

impl From<GraphPath> for GraphValue {
    fn from(path: GraphPath) -> Self {
        Self::Path(path)
    }
}

/// One result row, keyed by column name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: BTreeMap<String, GraphValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<GraphValue>) -> Self {
        self.columns.insert(column.to_string(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&GraphValue> {
        self.columns.get(column)
    }

    pub fn node(&self, column: &str) -> Option<&GraphNode> {
        match self.get(column)? {
            GraphValue::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn path(&self, column: &str) -> Option<&GraphPath> {
        match self.get(column)? {
            GraphValue::Path(path) => Some(path),
            _ => None,
        }
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            GraphValue::Scalar(value) => value.as_i64(),
            _ => None,
        }
    }

    pub fn string(&self, column: &str) -> Option<&str> {
        match self.get(column)? {
            GraphValue::Scalar(value) => value.as_str(),
            _ => None,
        }
    }

    /// String elements of a list column; empty when absent.
    pub fn strings(&self, column: &str) -> Vec<String> {
        match self.get(column) {
            Some(GraphValue::List(items)) => items
                .iter()
                .filter_map(|item| match item {
                    GraphValue::Scalar(Value::String(s)) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

// ── neo4rs conversion ─────────────────────────────────────────────

/// Read a scalar property, trying each supported type in turn.
macro_rules! scalar_property {
    ($entity:expr, $key:expr) => {
        $entity
            .get::<i64>($key)
            .map(Value::Int)
            .or_else(|_| $entity.get::<f64>($key).map(Value::Float))
            .or_else(|_| $entity.get::<bool>($key).map(Value::Bool))
            .or_else(|_| $entity.get::<String>($key).map(Value::String))
            .ok()
    };
}

pub(crate) fn node_from_neo4j(node: &neo4rs::Node) -> GraphNode {
    let properties = node
        .keys()
        .into_iter()
        .filter_map(|key| scalar_property!(node, key).map(|value| (key.to_string(), value)))
        .collect();
    GraphNode {
        id: node.id(),
        labels: node.labels().iter().map(|l| l.to_string()).collect(),
        properties,
    }
}

fn relation_from_neo4j(rel: &neo4rs::UnboundedRelation) -> GraphRelation {
    let properties = rel
        .keys()
        .into_iter()
        .filter_map(|key| scalar_property!(rel, key).map(|value| (key.to_string(), value)))
        .collect();
    GraphRelation {
        id: rel.id(),
        rel_type: rel.typ().to_string(),
        properties,
    }
}

fn path_from_neo4j(path: &neo4rs::Path) -> GraphPath {
    let nodes: Vec<GraphNode> = path.nodes().iter().map(node_from_neo4j).collect();
    let relations: Vec<GraphRelation> = path.rels().iter().map(relation_from_neo4j).collect();
    walk_path(&nodes, &relations, &path.indices())
}

/// Rebuild the walk from Bolt's deduplicated node and relationship lists.
///
/// `indices` holds (relationship, node) pairs. The relationship index is
/// 1-based and negative when traversed against its direction. The node index
/// is 0-based. Every walk starts at the first node.
fn walk_path(nodes: &[GraphNode], relations: &[GraphRelation], indices: &[i64]) -> GraphPath {
    let mut walk = GraphPath {
        nodes: nodes.first().cloned().into_iter().collect(),
        relations: Vec::with_capacity(indices.len() / 2),
    };
    for step in indices.chunks_exact(2) {
        let relation = usize::try_from(step[0].unsigned_abs())
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| relations.get(i));
        let node = usize::try_from(step[1]).ok().and_then(|i| nodes.get(i));
        let (Some(relation), Some(node)) = (relation, node) else {
            tracing::warn!(?step, "Path index out of range, truncating walk");
            break;
        };
        walk.relations.push(relation.clone());
        walk.nodes.push(node.clone());
    }
    walk
}

/// Convert the named columns of a driver row.
///
/// Bolt rows are not self-describing through `neo4rs`, so each column is
/// probed from the most to the least structured type.
pub(crate) fn row_from_neo4j(row: &neo4rs::Row, columns: &[String]) -> Row {
    let mut out = Row::new();
    for column in columns {
        let key = column.as_str();
        let value = if let Ok(path) = row.get::<neo4rs::Path>(key) {
            GraphValue::Path(path_from_neo4j(&path))
        } else if let Ok(node) = row.get::<neo4rs::Node>(key) {
            GraphValue::Node(node_from_neo4j(&node))
        } else if let Some(scalar) = scalar_property!(row, key) {
            GraphValue::Scalar(scalar)
        } else if let Ok(items) = row.get::<Vec<String>>(key) {
            GraphValue::List(items.into_iter().map(|s| GraphValue::Scalar(Value::String(s))).collect())
        } else if let Ok(items) = row.get::<Vec<i64>>(key) {
            GraphValue::List(items.into_iter().map(|i| GraphValue::Scalar(Value::Int(i))).collect())
        } else {
            GraphValue::Null
        };
        out.columns.insert(column.clone(), value);
    }
    out
}
