//! Errors from graph operations.

use pathguard_cypher::SyntaxDiagnostic;

use crate::executor::QueryMode;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    /// Malformed statement. Carries the diagnostic and the offending text.
    #[error("Cypher syntax error: {diagnostic}\n  in: {query}")]
    Syntax { diagnostic: String, query: String },

    /// Connectivity loss or transaction conflict. Callers may retry.
    #[error("Transient graph store error: {0}")]
    Transient(String),

    #[error("Query exceeded {timeout_ms}ms timeout")]
    Timeout { timeout_ms: u64 },

    /// A write timed out, possibly after its commit reached the store.
    #[error("Write exceeded {timeout_ms}ms timeout; commit outcome unknown")]
    WriteOutcomeUnknown { timeout_ms: u64 },

    #[error("Neo4j query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Refusing to run {clause} clause in read mode")]
    ReadOnlyViolation { clause: String },
}

impl GraphError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout { .. })
    }

    /// Timeout for a call in `mode`. Only reads are safe to repeat.
    pub fn timeout(mode: QueryMode, timeout_ms: u64) -> Self {
        match mode {
            QueryMode::Read => Self::Timeout { timeout_ms },
            QueryMode::Write => Self::WriteOutcomeUnknown { timeout_ms },
        }
    }

    pub fn syntax(diagnostic: &SyntaxDiagnostic, query: &str) -> Self {
        Self::Syntax {
            diagnostic: diagnostic.to_string(),
            query: query.to_string(),
        }
    }
}

impl From<neo4rs::Error> for GraphError {
    fn from(e: neo4rs::Error) -> Self {
        classify(e.to_string())
    }
}

/// Map a driver message onto the error taxonomy.
///
/// Neo4j status codes are embedded in the message text
/// (`Neo.ClientError.Statement.SyntaxError`, `Neo.TransientError.*`).
fn classify(message: String) -> GraphError {
    let lower = message.to_lowercase();
    if message.contains("SyntaxError") {
        GraphError::Syntax {
            diagnostic: message,
            query: String::new(),
        }
    } else if message.contains("TransientError")
        || message.contains("ServiceUnavailable")
        || lower.contains("connection")
        || lower.contains("io error")
        || lower.contains("broken pipe")
    {
        GraphError::Transient(message)
    } else {
        GraphError::Query(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_driver_messages() {
        assert!(matches!(
            classify("Neo.ClientError.Statement.SyntaxError: Invalid input".to_string()),
            GraphError::Syntax { .. }
        ));
        assert!(classify("Neo.TransientError.Transaction.DeadlockDetected".to_string()).is_retryable());
        assert!(classify("IO Error: Connection refused".to_string()).is_retryable());
        assert!(!classify("Neo.ClientError.Schema.ConstraintValidationFailed".to_string()).is_retryable());
    }

    #[test]
    fn only_read_timeouts_are_retryable() {
        assert!(GraphError::timeout(QueryMode::Read, 10).is_retryable());
        let write = GraphError::timeout(QueryMode::Write, 10);
        assert!(matches!(write, GraphError::WriteOutcomeUnknown { timeout_ms: 10 }));
        assert!(!write.is_retryable());
        assert!(!GraphError::ReadOnlyViolation {
            clause: "MERGE".to_string()
        }
        .is_retryable());
    }
}
