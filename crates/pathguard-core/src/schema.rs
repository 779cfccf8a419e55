//! Schema descriptors reflected from the relational store.
//!
//! A [`Schema`] is the raw input to the [`Catalog`](crate::Catalog): it lists
//! every model with its scalar and relation fields. It is usually loaded from
//! a JSON document produced by whatever reflects the relational database.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PathguardError;
use crate::types::ScalarType;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub models: Vec<ModelSchema>,
}

impl Schema {
    pub fn from_json(json: &str) -> Result<Self, PathguardError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PathguardError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PathguardError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }
}

/// One relational model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSchema {
    pub app_label: String,
    pub model_name: String,
    /// Class-style name, used as the graph node label (e.g. `Book`).
    pub object_name: String,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl ModelSchema {
    /// The `"<app_label>.<model_name>"` identifier of this model.
    pub fn kind_id(&self) -> String {
        format!("{}.{}", self.app_label, self.model_name).to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Scalar {
        scalar: ScalarType,
    },
    ForeignKey {
        to: String,
    },
    OneToOne {
        to: String,
    },
    ManyToMany {
        to: String,
        #[serde(default)]
        symmetrical: bool,
    },
    /// The reverse side of a relation declared on another model.
    Reverse {
        from: String,
        field: String,
        #[serde(default)]
        many: bool,
    },
    /// A relation whose target kind is only known per row.
    GenericForeignKey,
}
