//! pathguard-graph: Neo4j access for the mirror graph.
//!
//! Every graph read and write goes through the [`QueryExecutor`] seam.
//! [`GraphClient`] implements it against Neo4j with a per-call timeout and
//! read-mode guard. The [`GraphQueries`] extension trait holds the mirror
//! lookups, and [`mutations`] builds the write statements.

pub mod client;
pub mod error;
pub mod executor;
#[cfg(any(test, feature = "test_utils"))]
pub mod mock;
pub mod mutations;
pub mod queries;
pub mod row;

pub use client::{load_graph_config, GraphClient, GraphConfig};
pub use error::GraphError;
pub use executor::{CypherQuery, Param, QueryExecutor, QueryMode};
pub use queries::GraphQueries;
pub use row::{GraphNode, GraphPath, GraphRelation, GraphValue, Row};
