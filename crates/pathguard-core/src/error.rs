use thiserror::Error;

/// Configuration bugs in the schema or in an access rule.
///
/// These are surfaced to whoever triggered catalog lookup or rule
/// evaluation and are never skipped: a skipped hop changes what a rule means.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Unknown entity kind: {kind}")]
    UnknownKind { kind: String },

    #[error("{kind} has no relation type {label}")]
    NoSuchRelationship { kind: String, label: String },

    #[error("Relation type {label} on {kind} is ambiguous between fields {candidates:?}")]
    AmbiguousRelationship {
        kind: String,
        label: String,
        candidates: Vec<String>,
    },

    #[error("Duplicate relation type {label} on {kind}")]
    DuplicateRelationship { kind: String, label: String },

    #[error("Relationship {rel_type} has no property named '{property}'")]
    UnknownRelationProperty { rel_type: String, property: String },

    #[error("Relationship property '{property}' expects {expected}, got {found}")]
    PropertyType {
        property: String,
        expected: String,
        found: String,
    },

    #[error("Malformed rule step {index}: {reason}")]
    MalformedStep { index: usize, reason: String },
}

/// Top-level error type for pathguard.
#[derive(Error, Debug)]
pub enum PathguardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for PathguardError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
