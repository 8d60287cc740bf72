use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use datagrid::backends::{BackendConnection, ConnectionManager};
use datagrid::config::DatagridConfig;
use datagrid::dialect::{Dialect, DuckDbDialect};
use datagrid::error::{DatagridError, Result};
use datagrid::executor::{ColumnMeta, QueryResult};
use datagrid::schema::TableSchema;

/// Scripted backend: counts without a WHERE clause report `total`, counts
/// with one report `filtered`, every other select returns `rows`.
pub struct FakeConnection {
    pub tables: HashMap<String, Vec<String>>,
    pub probe_ok: bool,
    pub total: u64,
    pub filtered: u64,
    pub rows: Vec<Map<String, Value>>,
    pub fail_fetch: bool,
    pub log: Mutex<Vec<String>>,
}

impl FakeConnection {
    pub fn users() -> Self {
        let mut tables = HashMap::new();
        tables.insert(
            "users".to_string(),
            vec!["id".into(), "name".into(), "email".into(), "role_id".into()],
        );
        tables.insert("roles".to_string(), vec!["id".into(), "title".into()]);
        Self {
            tables,
            probe_ok: true,
            total: 3,
            filtered: 3,
            rows: vec![
                row(1, "alice", "alice@example.com"),
                row(2, "bob", "bob@example.com"),
                row(3, "carla", "carla@example.com"),
            ],
            fail_fetch: false,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn counts(&self) -> usize {
        self.statements()
            .iter()
            .filter(|sql| sql.contains("COUNT(*)"))
            .count()
    }
}

pub fn row(id: i64, name: &str, email: &str) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert("id".into(), json!(id));
    row.insert("name".into(), json!(name));
    row.insert("email".into(), json!(email));
    row
}

fn count_result(n: u64) -> QueryResult {
    let mut row = Map::new();
    row.insert("aggregate".into(), json!(n));
    QueryResult {
        columns: vec![ColumnMeta {
            name: "aggregate".into(),
        }],
        rows: vec![row],
    }
}

#[async_trait]
impl BackendConnection for FakeConnection {
    fn dialect(&self) -> &(dyn Dialect + Send + Sync) {
        &DuckDbDialect
    }

    async fn fetch_schema(&self, table: &str) -> Result<TableSchema> {
        self.tables
            .get(table)
            .map(|cols| TableSchema::from_names(cols.iter().cloned()))
            .ok_or_else(|| DatagridError::Schema(format!("table {table} not found")))
    }

    async fn execute_sql(&self, sql: &str) -> Result<QueryResult> {
        self.log.lock().unwrap().push(sql.to_string());
        if sql.starts_with("SELECT 1 FROM") {
            return if self.probe_ok {
                Ok(QueryResult::default())
            } else {
                Err(DatagridError::Execution("connection refused".into()))
            };
        }
        if sql.contains("COUNT(*)") {
            let n = if sql.contains(" WHERE ") {
                self.filtered
            } else {
                self.total
            };
            return Ok(count_result(n));
        }
        if self.fail_fetch {
            return Err(DatagridError::Execution("fetch exploded".into()));
        }
        Ok(QueryResult {
            columns: Vec::new(),
            rows: self.rows.clone(),
        })
    }
}

pub fn manager_with(connections: Vec<(&str, Arc<FakeConnection>)>, default: &str) -> ConnectionManager {
    let mut config = DatagridConfig::default();
    config.connections.default = default.to_string();
    manager_with_config(connections, config)
}

pub fn manager_with_config(
    connections: Vec<(&str, Arc<FakeConnection>)>,
    config: DatagridConfig,
) -> ConnectionManager {
    let mut manager = ConnectionManager::with_config(config);
    for (name, conn) in connections {
        manager.insert(name, conn);
    }
    manager
}
