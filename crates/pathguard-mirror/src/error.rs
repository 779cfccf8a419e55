//! Error types for the pathguard-mirror crate.

use pathguard_core::SchemaError;
use pathguard_graph::GraphError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Row source error: {0}")]
    Source(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MirrorError>;
