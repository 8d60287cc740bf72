//! Database backend implementations.
//!
//! Each backend is implemented in its own file and gated behind a feature flag.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{DatagridConfig, ResolvedDatasourceConfig};
use crate::dialect::Dialect;
use crate::error::Result;
use crate::executor::QueryResult;
use crate::schema::TableSchema;

/// Unified interface for all database backends.
///
/// Doubles as the schema accessor the planners consult.
#[async_trait]
pub trait BackendConnection: Send + Sync {
    fn dialect(&self) -> &(dyn Dialect + Send + Sync);
    async fn fetch_schema(&self, table: &str) -> Result<TableSchema>;
    async fn execute_sql(&self, sql: &str) -> Result<QueryResult>;

    async fn has_table(&self, table: &str) -> Result<bool> {
        Ok(self
            .fetch_schema(table)
            .await
            .map(|schema| !schema.is_empty())
            .unwrap_or(false))
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.fetch_schema(table).await?.column_names())
    }
}

/// Connection registry keyed by connection name.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    connections: HashMap<String, Arc<dyn BackendConnection>>,
    config: DatagridConfig,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connection manager with configuration.
    pub fn with_config(config: DatagridConfig) -> Self {
        Self {
            connections: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &DatagridConfig {
        &self.config
    }

    /// Get resolved configuration for a specific connection.
    pub fn config_for(&self, name: &str) -> ResolvedDatasourceConfig {
        self.config.for_datasource(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, conn: Arc<dyn BackendConnection>) {
        self.connections.insert(name.into(), conn);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn BackendConnection>> {
        self.connections.get(name)
    }

    /// Name of the process default connection.
    pub fn default_name(&self) -> &str {
        &self.config.connections.default
    }

    /// Registered connection names in probe order: the default first, then the
    /// configured order, then anything else alphabetically.
    pub fn probe_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::with_capacity(self.connections.len());
        let push = |name: &str, order: &mut Vec<String>| {
            if self.connections.contains_key(name) && !order.iter().any(|n| n == name) {
                order.push(name.to_string());
            }
        };
        push(self.default_name(), &mut order);
        for name in &self.config.connections.order {
            push(name, &mut order);
        }
        let mut rest: Vec<&String> = self.connections.keys().collect();
        rest.sort();
        for name in rest {
            push(name, &mut order);
        }
        order
    }
}

// Feature-gated backend implementations
#[cfg(feature = "duckdb")]
mod duckdb;
#[cfg(feature = "duckdb")]
pub use duckdb::DuckDbConnection;

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PostgresConnection;
