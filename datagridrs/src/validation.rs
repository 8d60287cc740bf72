use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::backends::ConnectionManager;
use crate::descriptor::ColumnDescriptor;
use crate::error::{DatagridError, Result};
use crate::query_builder::columns::{is_pseudo_column, is_safe_identifier, split_qualified};
use crate::query_builder::joins::plan_edges;
use crate::query_builder::{connection_for, load_base_schema, resolve_table};
use crate::registry::TableRegistry;

/// Bootstrap check of descriptors against the live schema.
pub struct Validator {
    connections: ConnectionManager,
    warn_only: bool,
}

impl Validator {
    pub fn new(connections: ConnectionManager, warn_only: bool) -> Self {
        Self {
            connections,
            warn_only,
        }
    }

    pub async fn validate_registry(&self, registry: &TableRegistry) -> Result<()> {
        let mut names: Vec<&String> = registry.tables.keys().collect();
        names.sort();
        for name in names {
            if let Some(descriptor) = registry.get(name) {
                self.validate_descriptor(descriptor).await?;
            }
        }
        Ok(())
    }

    pub async fn validate_descriptor(&self, descriptor: &ColumnDescriptor) -> Result<()> {
        let table = match resolve_table(descriptor, &self.connections) {
            Ok(table) => table,
            Err(e) => return self.check(false, format!("table {}: {e}", descriptor.name)),
        };
        let connection = connection_for(descriptor, &self.connections);
        let Some(conn) = self.connections.get(&connection) else {
            return self.check(
                false,
                format!(
                    "table {} uses unregistered connection {connection}",
                    descriptor.name
                ),
            );
        };
        let budget = Duration::from_millis(
            self.connections
                .config_for(&connection)
                .query
                .statement_timeout_ms,
        );

        let base_schema = match load_base_schema(conn.as_ref(), &table, budget).await {
            Ok(schema) => schema,
            Err(e) => {
                return self.check(
                    false,
                    format!("table {} base schema unavailable: {e}", descriptor.name),
                )
            }
        };
        let mut columns: HashMap<String, HashSet<String>> = HashMap::new();
        columns.insert(
            table.relation.clone(),
            base_schema.column_names().into_iter().collect(),
        );

        let (edges, rejected) = plan_edges(&table.relation, &descriptor.joins);
        for join in rejected {
            self.check(
                false,
                format!(
                    "table {} join {} -> {}: {}",
                    descriptor.name, join.left, join.right, join.reason
                ),
            )?;
        }
        let mut joined_outputs: HashSet<String> = HashSet::new();
        for edge in &edges {
            let listed = match conn.list_columns(&edge.table).await {
                Ok(listed) => listed,
                Err(e) => {
                    self.check(
                        false,
                        format!(
                            "table {} joined table {} unavailable: {e}",
                            descriptor.name, edge.table
                        ),
                    )?;
                    continue;
                }
            };
            for column in &listed {
                joined_outputs.insert(if column == "id" {
                    format!("{}_id", edge.table)
                } else {
                    column.clone()
                });
            }
            columns.insert(edge.table.clone(), listed.into_iter().collect());

            for (side_table, side_column) in [&edge.existing, &edge.joined] {
                let present = columns
                    .get(side_table)
                    .map(|c| c.contains(side_column))
                    .unwrap_or(false);
                self.check(
                    present,
                    format!(
                        "table {} join key {side_table}.{side_column} not found",
                        descriptor.name
                    ),
                )?;
            }
        }

        let base_columns = &columns[&table.relation];
        for column in &descriptor.columns {
            if is_pseudo_column(column) {
                continue;
            }
            if !is_safe_identifier(column) {
                self.check(
                    false,
                    format!("table {} column '{column}' is not a safe identifier", descriptor.name),
                )?;
                continue;
            }
            let present = match split_qualified(column) {
                Some((t, c)) => columns.get(t).map(|cols| cols.contains(c)).unwrap_or(false),
                None => base_columns.contains(column) || joined_outputs.contains(column),
            };
            self.check(
                present,
                format!("table {} exposes missing column {column}", descriptor.name),
            )?;
        }

        for field in descriptor.formats.keys() {
            self.check(
                descriptor.exposes(field),
                format!("table {} formats unexposed field {field}", descriptor.name),
            )?;
        }

        for condition in &descriptor.conditions {
            let present = match split_qualified(&condition.field) {
                Some((t, c)) => columns.get(t).map(|cols| cols.contains(c)).unwrap_or(false),
                None => base_columns.contains(&condition.field),
            };
            self.check(
                is_safe_identifier(&condition.field) && present,
                format!(
                    "table {} condition references missing column {}",
                    descriptor.name, condition.field
                ),
            )?;
        }

        self.check(
            base_columns.contains(&descriptor.identifier),
            format!(
                "table {} identifier {} missing on {}",
                descriptor.name, descriptor.identifier, table.relation
            ),
        )
    }

    fn check(&self, condition: bool, message: String) -> Result<()> {
        if condition {
            return Ok(());
        }
        if self.warn_only {
            tracing::warn!("{message}");
            Ok(())
        } else {
            Err(DatagridError::Validation(message))
        }
    }
}
