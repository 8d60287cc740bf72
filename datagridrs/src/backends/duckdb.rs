//! DuckDB backend implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

use crate::config::DuckDbConfig;
use crate::dialect::DuckDbDialect;
use crate::error::{DatagridError, Result};
use crate::executor::{ColumnMeta, QueryResult};
use crate::schema::{ColumnSchema, TableSchema};

use super::BackendConnection;

/// DuckDB connection implementing the unified backend trait.
#[derive(Clone)]
pub struct DuckDbConnection {
    database_path: PathBuf,
    dialect: DuckDbDialect,
    limiter: Arc<Semaphore>,
    pool: Arc<Mutex<Vec<duckdb::Connection>>>,
}

impl DuckDbConnection {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_config(path, &DuckDbConfig::default())
    }

    pub fn with_config<P: AsRef<Path>>(path: P, config: &DuckDbConfig) -> Self {
        let path = path.as_ref().to_path_buf();
        tracing::info!(
            path = %path.display(),
            max_concurrency = config.max_concurrency,
            "creating DuckDB connection"
        );
        Self {
            database_path: path,
            dialect: DuckDbDialect,
            limiter: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            pool: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn acquire_slot(&self) -> Result<SemaphorePermit<'_>> {
        if self.limiter.available_permits() == 0 {
            tracing::debug!("all DuckDB slots in use, waiting for permit");
        }
        self.limiter
            .acquire()
            .await
            .map_err(|e| DatagridError::Execution(format!("limiter closed: {e}")))
    }

    async fn checkout_connection(&self) -> Result<duckdb::Connection> {
        let mut guard = self.pool.lock().await;
        if let Some(conn) = guard.pop() {
            let pool_size = guard.len();
            drop(guard);
            tracing::trace!(pool_remaining = pool_size, "reusing pooled DuckDB connection");
            return Ok(conn);
        }
        drop(guard);
        tracing::debug!(path = %self.database_path.display(), "opening new DuckDB connection");
        duckdb::Connection::open(self.database_path.clone())
            .map_err(|e| DatagridError::Execution(format!("open duckdb: {e}")))
    }

    /// Run `work` on a pooled connection off the async runtime and hand the
    /// connection back to the pool afterwards.
    async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&duckdb::Connection) -> Result<T> + Send + 'static,
    {
        let _permit = self.acquire_slot().await?;
        let conn = self.checkout_connection().await?;
        let (result, conn) = tokio::task::spawn_blocking(move || {
            let result = work(&conn);
            (result, conn)
        })
        .await
        .map_err(|e| DatagridError::Execution(format!("task join error: {e}")))?;
        self.pool.lock().await.push(conn);
        result
    }
}

#[async_trait]
impl BackendConnection for DuckDbConnection {
    fn dialect(&self) -> &(dyn crate::dialect::Dialect + Send + Sync) {
        &self.dialect
    }

    async fn fetch_schema(&self, table: &str) -> Result<TableSchema> {
        let table = table.to_string();
        self.with_connection(move |conn| {
            let start = Instant::now();
            let pragma_sql = format!("PRAGMA table_info('{}')", table.replace('\'', "''"));
            let mut stmt = conn.prepare(&pragma_sql)?;
            let mut rows = stmt.query([])?;
            let mut columns = Vec::new();
            let mut primary_keys = Vec::new();
            while let Some(row) = rows.next()? {
                let name: String = row.get("name")?;
                let data_type: String = row.get("type")?;
                let not_null: bool = row.get("notnull")?;
                let pk_flag: bool = row.get("pk")?;
                if pk_flag {
                    primary_keys.push(name.clone());
                }
                columns.push(ColumnSchema {
                    name,
                    data_type,
                    nullable: !not_null,
                });
            }
            if columns.is_empty() {
                return Err(DatagridError::Schema(format!("table {table} not found")));
            }
            tracing::debug!(
                table = table.as_str(),
                columns = columns.len(),
                ms = start.elapsed().as_millis(),
                "duckdb fetch_schema"
            );
            Ok(TableSchema {
                columns,
                primary_keys,
            })
        })
        .await
    }

    async fn execute_sql(&self, sql: &str) -> Result<QueryResult> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            let start = Instant::now();
            tracing::trace!(sql = %sql, "executing DuckDB query");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows_iter = stmt.query([])?;
            let stmt_ref = rows_iter
                .as_ref()
                .ok_or_else(|| DatagridError::Execution("statement missing".to_string()))?;
            let mut column_names = Vec::new();
            for idx in 0..stmt_ref.column_count() {
                let name = stmt_ref
                    .column_name(idx)
                    .map_err(|e| DatagridError::Execution(e.to_string()))?;
                column_names.push(name.to_string());
            }
            let mut rows = Vec::new();
            while let Some(row) = rows_iter.next()? {
                let mut map = serde_json::Map::new();
                for (idx, name) in column_names.iter().enumerate() {
                    let value = crate::executor::duck_value_to_json(row.get_ref(idx)?.to_owned());
                    // Duplicate column names collapse, last one wins.
                    map.insert(name.clone(), value);
                }
                rows.push(map);
            }

            let columns: Vec<_> = column_names
                .into_iter()
                .map(|name| ColumnMeta { name })
                .collect();
            tracing::debug!(
                rows = rows.len(),
                columns = columns.len(),
                ms = start.elapsed().as_millis(),
                "duckdb execute_sql"
            );
            Ok(QueryResult { columns, rows })
        })
        .await
    }
}
