//! Neo4j connection management and the production query executor.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{BoltNull, BoltType, ConfigBuilder, Graph, Query};
use serde::Deserialize;

use pathguard_core::Value;

use crate::error::GraphError;
use crate::executor::{guard_mode, CypherQuery, Param, QueryExecutor, QueryMode};
use crate::row::{row_from_neo4j, Row};

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
    /// Upper bound on a single `run` call, in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "pathguard-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_query_timeout_ms() -> u64 {
    5000
}

/// Read the `[neo4j]` section, falling back to defaults when absent or invalid.
pub fn load_graph_config(cfg: &config::Config) -> GraphConfig {
    cfg.get::<GraphConfig>("neo4j").unwrap_or_else(|e| {
        if !matches!(e, config::ConfigError::NotFound(_)) {
            tracing::warn!(error = %e, "Invalid [neo4j] configuration, using defaults");
        }
        GraphConfig::default()
    })
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
    timeout: Duration,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, timeout_ms = config.query_timeout_ms, "Connected to Neo4j");
        Ok(Self {
            graph,
            timeout: Duration::from_millis(config.query_timeout_ms),
        })
    }

    /// Get a reference to the underlying neo4rs Graph for direct operations.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    /// Auto-commit read; rows are decoded as they stream in.
    async fn read_rows(&self, query: Query, columns: &[String]) -> Result<Vec<Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row_from_neo4j(&row, columns));
        }
        Ok(rows)
    }

    /// Explicit write transaction, committed before returning.
    async fn write(&self, query: Query) -> Result<(), GraphError> {
        let mut txn = self.graph.start_txn().await?;
        txn.run(query).await?;
        txn.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl QueryExecutor for GraphClient {
    /// Write-mode calls return no rows.
    async fn run(&self, query: &CypherQuery, mode: QueryMode) -> Result<Vec<Row>, GraphError> {
        guard_mode(query, mode)?;
        tracing::debug!(%mode, query = %query.text, "Running query");

        let bolt = to_neo4j(query);
        let call = async {
            match mode {
                QueryMode::Read => self.read_rows(bolt, &query.columns).await,
                QueryMode::Write => self.write(bolt).await.map(|()| Vec::new()),
            }
        };

        let result = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| GraphError::timeout(mode, self.timeout.as_millis() as u64))?;

        // The driver does not echo the statement; attach it for diagnostics.
        result.map_err(|e| match e {
            GraphError::Syntax { diagnostic, .. } => GraphError::Syntax {
                diagnostic,
                query: query.text.clone(),
            },
            other => other,
        })
    }
}

fn to_neo4j(query: &CypherQuery) -> Query {
    query
        .params
        .iter()
        .fold(neo4rs::query(&query.text), |q, (key, param)| {
            q.param(key, bolt_param(param))
        })
}

fn bolt_param(param: &Param) -> BoltType {
    match param {
        Param::Value(value) => bolt_value(value),
        Param::List(values) => BoltType::from(values.iter().map(bolt_value).collect::<Vec<_>>()),
        Param::Map(map) => BoltType::from(
            map.iter()
                .map(|(k, v)| (k.clone(), bolt_value(v)))
                .collect::<HashMap<String, BoltType>>(),
        ),
    }
}

fn bolt_value(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Int(i) => BoltType::from(*i),
        Value::Float(f) => BoltType::from(*f),
        Value::String(s) => BoltType::from(s.clone()),
    }
}
