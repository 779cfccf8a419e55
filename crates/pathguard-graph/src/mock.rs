//! In-memory [`QueryExecutor`] for tests.
//!
//! Answers every query through a handler closure and records each submitted
//! query. Enabled with the `test_utils` feature.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::GraphError;
use crate::executor::{guard_mode, CypherQuery, QueryExecutor, QueryMode};
use crate::row::Row;

type Handler = dyn Fn(&CypherQuery, QueryMode) -> Result<Vec<Row>, GraphError> + Send + Sync;

pub struct MockExecutor {
    handler: Box<Handler>,
    calls: Mutex<Vec<(QueryMode, CypherQuery)>>,
}

impl MockExecutor {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&CypherQuery, QueryMode) -> Result<Vec<Row>, GraphError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every query returns no rows.
    pub fn empty() -> Self {
        Self::new(|_, _| Ok(Vec::new()))
    }

    /// Number of queries submitted so far, including rejected ones.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn calls(&self) -> Vec<(QueryMode, CypherQuery)> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Submitted query texts containing `needle`.
    pub fn texts_containing(&self, needle: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, q)| q.text.contains(needle))
            .map(|(_, q)| q.text.clone())
            .collect()
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn run(&self, query: &CypherQuery, mode: QueryMode) -> Result<Vec<Row>, GraphError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((mode, query.clone()));
        guard_mode(query, mode)?;
        (self.handler)(query, mode)
    }
}

#[cfg(test)]
mod tests {
    use pathguard_core::Value;

    use super::*;

    #[tokio::test]
    async fn records_calls_and_answers() {
        let mock = MockExecutor::new(|q, _| {
            Ok(vec![Row::new().with("n", Value::Int(q.text.len() as i64))])
        });
        let q = CypherQuery::new("MATCH (n) RETURN count(n) AS n").returning(["n"]);

        let rows = mock.run(&q, QueryMode::Read).await.unwrap();
        assert_eq!(rows[0].int("n"), Some(q.text.len() as i64));
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.calls()[0].0, QueryMode::Read);
        assert_eq!(mock.texts_containing("count(n)").len(), 1);
    }

    #[tokio::test]
    async fn enforces_read_mode() {
        let mock = MockExecutor::empty();
        let q = CypherQuery::new("MERGE (n:Book {uid: $uid})").param("uid", "x");
        assert!(matches!(
            mock.run(&q, QueryMode::Read).await,
            Err(GraphError::ReadOnlyViolation { .. })
        ));
        assert!(mock.run(&q, QueryMode::Write).await.unwrap().is_empty());
        assert_eq!(mock.call_count(), 2);
    }
}
