//! Error types for the pathguard-cypher crate.

use thiserror::Error;

use pathguard_core::SchemaError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("{node} has no attribute '{attribute}'")]
    UnknownAttribute { node: String, attribute: String },

    #[error("Target index {index} out of range: only {hops} hop(s) added")]
    BackReferenceOutOfRange { index: usize, hops: usize },

    #[error("Back-reference {label} reaches {found}, but hop {index} reached {expected}")]
    BackReferenceKindMismatch {
        label: String,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("Relation type must not be empty")]
    EmptyRelationType,

    #[error("Path has no hops")]
    EmptyPath,

    #[error("Cannot traverse {label} from a node without a kind")]
    UntypedFrontier { label: String },

    #[error("Hop {index} does not continue from the previous hop's target")]
    Discontinuous { index: usize },
}

pub type Result<T> = std::result::Result<T, PathError>;
