//! pathguard-mirror: keeps the Neo4j graph in step with relational rows.
//!
//! The persistence layer calls a [`MirrorWriter`] after every save and
//! delete. [`GraphMirror`] writes one node per row and one edge per related
//! row, honoring the `enabled`, `ignore_models`, `max_connection_depth` and
//! `connect_meta_nodes` settings. [`meta`] maintains the per-kind meta graph
//! and uniqueness constraints.

pub mod error;
pub mod meta;
pub mod writer;

pub use error::MirrorError;
pub use meta::{ensure_constraints, sync_meta_graph};
pub use writer::{GraphMirror, InMemoryRows, MirrorWriter, RowSource, SyncReport};
