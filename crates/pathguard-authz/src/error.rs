//! Error types for the pathguard-authz crate.

use pathguard_core::SchemaError;
use pathguard_cypher::PathError;
use pathguard_graph::GraphError;
use thiserror::Error;

/// Why a permission could not be determined.
///
/// A denial is never an error: evaluation returns `Ok(false)`. These
/// variants mean "could not decide" and callers choose whether to fail closed.
#[derive(Error, Debug)]
pub enum AuthzError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Permission {permission} does not belong to app {expected}")]
    PermissionLabel { permission: String, expected: String },

    #[error("Rule store error: {0}")]
    RuleStore(String),

    #[error("Unknown access rule {0}")]
    UnknownRule(u64),

    #[error("Graph evaluation is disabled")]
    Disabled,

    #[error("Rule task failed: {0}")]
    Task(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AuthzError>;
