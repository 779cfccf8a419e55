//! The query execution seam between graph logic and the store.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use pathguard_core::{PropertyMap, Value};

use crate::error::GraphError;
use crate::row::Row;

/// Transaction mode of a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryMode {
    /// May be routed to a read replica. Mutating clauses are rejected.
    Read,
    Write,
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// A bound query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Value(Value),
    List(Vec<Value>),
    Map(PropertyMap),
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

macro_rules! param_from_scalar {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Param {
            fn from(value: $ty) -> Self {
                Self::Value(Value::from(value))
            }
        })*
    };
}

param_from_scalar!(&str, String, i64, bool, f64);

/// Cypher text, its parameters, and the result columns to decode.
#[derive(Debug, Clone, PartialEq)]
pub struct CypherQuery {
    pub text: String,
    pub params: BTreeMap<String, Param>,
    pub columns: Vec<String>,
}

impl CypherQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: BTreeMap::new(),
            columns: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Param>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn list_param(mut self, key: &str, values: Vec<Value>) -> Self {
        self.params.insert(key.to_string(), Param::List(values));
        self
    }

    pub fn map_param(mut self, key: &str, map: PropertyMap) -> Self {
        self.params.insert(key.to_string(), Param::Map(map));
        self
    }

    /// Declare the result columns read back from each row.
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// Runs one query in one transaction.
///
/// Implementations acquire a session and a single read or write transaction
/// per call and release both before returning. Retry policy is left to
/// callers.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn run(&self, query: &CypherQuery, mode: QueryMode) -> Result<Vec<Row>, GraphError>;
}

/// Reject statements that cannot run in `mode`.
pub fn guard_mode(query: &CypherQuery, mode: QueryMode) -> Result<(), GraphError> {
    if mode == QueryMode::Read {
        if let Some(clause) = pathguard_cypher::validate::mutating_clause(&query.text) {
            return Err(GraphError::ReadOnlyViolation {
                clause: clause.to_string(),
            });
        }
    }
    pathguard_cypher::validate::check_balanced(&query.text)
        .map_err(|diagnostic| GraphError::syntax(&diagnostic, &query.text))
}
