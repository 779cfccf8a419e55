//! pathguard-cypher: typed relationship paths rendered as Cypher.
//!
//! [`PathBuilder`] resolves a chain of relationship labels against the
//! [`Catalog`](pathguard_core::Catalog) and renders one `MATCH` statement.
//! Rendering goes through the pattern model in [`pattern`], which owns all
//! quoting. [`validate`] holds the structural pre-checks run before a
//! statement is submitted.

pub mod builder;
pub mod error;
pub mod filters;
pub mod pattern;
pub mod validate;

pub use builder::{HopOptions, PathBuilder, PATH_COLUMN};
pub use error::PathError;
pub use validate::{check_syntax, SyntaxDiagnostic};
