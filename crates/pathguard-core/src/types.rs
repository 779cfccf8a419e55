//! Core domain types shared by the catalog, path builder, mirror, and evaluator.
//!
//! Entity instances are represented generically (kind name + primary key +
//! property map) rather than one Rust type per relational model.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace UUID for deterministic mirror node keys.
const MIRROR_NS: Uuid = Uuid::from_bytes([
    0x3f, 0x0c, 0x6e, 0x52, 0x8a, 0x1d, 0x4b, 0x7e, 0x9c, 0x21, 0x55, 0x0a, 0xd3, 0x6f, 0x81, 0x4e,
]);

// ── Values ────────────────────────────────────────────────────────

/// A scalar property value stored on a mirror node or used as a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Ordered property map. Ordering keeps rendered statements deterministic.
pub type PropertyMap = BTreeMap<String, Value>;

/// Primitive type of a scalar field or relationship property.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
}

impl ScalarType {
    /// Whether `value` can be stored in a property of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (Self::String | Self::DateTime, Value::String(_))
                | (Self::Integer, Value::Int(_))
                | (Self::Float, Value::Float(_) | Value::Int(_))
                | (Self::Boolean, Value::Bool(_))
        )
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

// ── Relationships ─────────────────────────────────────────────────

/// Arrow direction of a relationship in the graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
    /// Mutual relationships match in either direction.
    Either,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ZeroOrOne,
    ZeroOrMore,
}

// ── Entity instances ──────────────────────────────────────────────

/// One relational row, addressed by entity kind and primary key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityInstance {
    /// Entity kind identifier, `"<app_label>.<model_name>"`, lowercase.
    #[serde(deserialize_with = "deserialize_kind")]
    pub kind: String,
    pub pk: i64,
    /// Scalar field values.
    #[serde(default)]
    pub fields: PropertyMap,
    /// Related primary keys per relationship field name.
    #[serde(default)]
    pub relations: BTreeMap<String, Vec<i64>>,
}

impl EntityInstance {
    pub fn new(kind: &str, pk: i64) -> Self {
        Self {
            kind: kind.to_lowercase(),
            pk,
            fields: PropertyMap::new(),
            relations: BTreeMap::new(),
        }
    }

    /// A zero-valued instance used to preview statements without a real row.
    pub fn placeholder(kind: &str) -> Self {
        Self::new(kind, 0)
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_relation(mut self, field: &str, pks: &[i64]) -> Self {
        self.relations.insert(field.to_string(), pks.to_vec());
        self
    }

    /// Read an attribute by name. `pk` is always available.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        if name == "pk" {
            return Some(Value::Int(self.pk));
        }
        self.fields.get(name).cloned()
    }

    pub fn app_label(&self) -> &str {
        split_kind(&self.kind).0
    }

    pub fn model_name(&self) -> &str {
        split_kind(&self.kind).1
    }

    /// Deterministic mirror key for this row.
    pub fn uid(&self) -> Uuid {
        Uuid::new_v5(&MIRROR_NS, format!("{}:{}", self.kind.to_lowercase(), self.pk).as_bytes())
    }
}

impl fmt::Display for EntityInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} pk={}>", self.kind, self.pk)
    }
}

fn deserialize_kind<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(|kind| kind.to_lowercase())
}

/// Split a kind identifier into `(app_label, model_name)`.
pub fn split_kind(kind: &str) -> (&str, &str) {
    kind.split_once('.').unwrap_or(("", kind))
}

// ── Subjects ──────────────────────────────────────────────────────

/// The identity a permission check is evaluated for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "identity", rename_all = "snake_case")]
pub enum Subject {
    User(UserIdentity),
    Group(GroupIdentity),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub instance: EntityInstance,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub is_staff: bool,
    /// Primary keys of the groups this user belongs to.
    #[serde(default)]
    pub groups: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupIdentity {
    pub instance: EntityInstance,
}

impl Subject {
    pub fn instance(&self) -> &EntityInstance {
        match self {
            Self::User(u) => &u.instance,
            Self::Group(g) => &g.instance,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Self::User(u) => u.is_active,
            Self::Group(_) => true,
        }
    }

    pub fn is_superuser(&self) -> bool {
        match self {
            Self::User(u) => u.is_superuser,
            Self::Group(_) => false,
        }
    }
}

// ── Access rules ──────────────────────────────────────────────────

/// A declared traversal that grants a set of permissions from a source
/// kind to a target kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRule {
    pub id: u64,
    #[serde(default)]
    pub description: String,
    pub source_kind: String,
    pub target_kind: String,
    pub steps: Vec<RuleStep>,
    /// Permission codenames granted by this rule.
    pub permissions: BTreeSet<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Adds `is_staff: true` to the first step's source filter.
    #[serde(default)]
    pub requires_staff: bool,
    /// Forces every hop's arrow direction when set.
    #[serde(default)]
    pub direction: Option<Direction>,
}

impl AccessRule {
    pub fn grants(&self, codename: &str) -> bool {
        self.permissions.contains(codename)
    }
}

/// One relationship-label step of an access rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleStep {
    pub relation: String,
    #[serde(default)]
    pub source_filters: PropertyMap,
    #[serde(default)]
    pub target_filters: PropertyMap,
}

impl RuleStep {
    pub fn new(relation: &str) -> Self {
        Self {
            relation: relation.to_string(),
            source_filters: PropertyMap::new(),
            target_filters: PropertyMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}
