//! Table and connection resolution.

use std::time::Duration;

use crate::backends::{BackendConnection, ConnectionManager};
use crate::descriptor::{ColumnDescriptor, TableSource};
use crate::error::{DatagridError, Result};
use crate::executor::run_sql;
use crate::schema::TableSchema;
use crate::sql_ast::{SqlRenderer, TableRef};

use super::columns::is_safe_identifier;

/// Base relation of a descriptor bound to the connection it should be read from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTable {
    pub from: TableRef,
    /// Name qualified columns of the base use.
    pub relation: String,
    pub connection: String,
    /// True when the base is a derived table over raw SQL.
    pub derived: bool,
}

/// Connection name a descriptor should be served from: the bound model's own
/// connection, then the declared one, then the descriptor default, then the
/// process default.
pub fn connection_for(descriptor: &ColumnDescriptor, manager: &ConnectionManager) -> String {
    let model_connection = match &descriptor.source {
        TableSource::Model(model) => model.connection(),
        _ => None,
    };
    model_connection
        .or(descriptor.connection.as_deref())
        .or(descriptor.default_connection.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| manager.default_name())
        .to_string()
}

pub fn resolve_table(
    descriptor: &ColumnDescriptor,
    manager: &ConnectionManager,
) -> Result<ResolvedTable> {
    let connection = connection_for(descriptor, manager);
    let (from, derived) = match &descriptor.source {
        TableSource::Model(model) => (named(model.table())?, false),
        TableSource::Named(name) => (named(name)?, false),
        TableSource::RawSql { sql, alias } => {
            let alias = alias.trim();
            if !is_safe_identifier(alias) || alias.contains('.') {
                return Err(DatagridError::Validation(format!(
                    "invalid derived table alias '{alias}'"
                )));
            }
            let sql = sql.trim().trim_end_matches(';').trim();
            if sql.is_empty() {
                return Err(DatagridError::Validation(format!(
                    "raw SQL source '{alias}' is empty"
                )));
            }
            (
                TableRef {
                    name: alias.to_string(),
                    alias: None,
                    subquery: Some(sql.to_string()),
                },
                true,
            )
        }
    };
    Ok(ResolvedTable {
        relation: from.name.clone(),
        from,
        connection,
        derived,
    })
}

fn named(table: &str) -> Result<TableRef> {
    let table = table.trim();
    if !is_safe_identifier(table) {
        return Err(DatagridError::Validation(format!(
            "invalid table name '{table}'"
        )));
    }
    Ok(TableRef {
        name: table.to_string(),
        alias: None,
        subquery: None,
    })
}

/// Live schema of the base relation. Derived tables are described by running
/// them with `LIMIT 0` and reading the result columns.
pub async fn load_base_schema(
    conn: &dyn BackendConnection,
    table: &ResolvedTable,
    budget: Duration,
) -> Result<TableSchema> {
    if !table.derived {
        return crate::executor::with_timeout(budget, conn.fetch_schema(&table.relation)).await;
    }
    let sql = SqlRenderer::new(conn.dialect()).render_shape(&table.from);
    let result = run_sql(conn, &sql, budget).await?;
    if result.columns.is_empty() {
        return Err(DatagridError::Schema(format!(
            "derived table '{}' returned no columns",
            table.relation
        )));
    }
    Ok(TableSchema::from_names(
        result.columns.into_iter().map(|c| c.name),
    ))
}
