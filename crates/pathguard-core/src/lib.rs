//! pathguard-core: Shared types, schema catalog, configuration, and error handling.
//!
//! This crate provides the foundational pieces used by every pathguard component:
//! - The relational data model (values, entity instances, subjects, access rules)
//! - Schema descriptors reflected from the relational store
//! - The relationship catalog resolved lazily per entity kind
//! - Settings management
//! - Common error types

pub mod catalog;
pub mod config;
pub mod error;
pub mod schema;
pub mod types;

pub use catalog::{Catalog, EntityKind, RelationshipField, RelationshipModel};
pub use config::Settings;
pub use error::{PathguardError, SchemaError};
pub use schema::Schema;
pub use types::{
    AccessRule, Cardinality, Direction, EntityInstance, PropertyMap, RuleStep, ScalarType,
    Subject, Value,
};
