//! Column reference safety and qualification.
//!
//! Every column that reaches SQL from client input passes through a
//! [`ColumnScope`], which knows the whitelist, the live base schema and the
//! columns contributed by joins.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::sql_ast::SqlExpr;

static SAFE_IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.]+$").unwrap());

/// Pseudo-columns that carry the row ordinal.
pub const ROW_INDEX_COLUMNS: &[&str] = &["DT_RowIndex", "number_lists", "no"];
/// Pseudo-column that carries rendered row actions.
pub const ACTION_COLUMN: &str = "action";

pub fn is_safe_identifier(name: &str) -> bool {
    SAFE_IDENTIFIER.is_match(name)
        && !name.starts_with('.')
        && !name.ends_with('.')
        && !name.contains("..")
}

pub fn is_row_index_column(name: &str) -> bool {
    ROW_INDEX_COLUMNS.contains(&name)
}

pub fn is_pseudo_column(name: &str) -> bool {
    is_row_index_column(name) || name == ACTION_COLUMN
}

/// Split `table.column` into its parts; `None` for bare names.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    let (table, column) = name.rsplit_once('.')?;
    if table.is_empty() || column.is_empty() {
        return None;
    }
    Some((table, column))
}

/// Key a selected column appears under in fetched rows.
pub fn row_key(base: &str, name: &str) -> String {
    match split_qualified(name) {
        Some((table, "id")) if table != base => format!("{table}_id"),
        Some((_, column)) => column.to_string(),
        None => name.to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ColumnScope {
    base: String,
    exposed: Vec<String>,
    base_columns: Vec<String>,
    /// Output name of a joined column -> (table, column).
    joined: HashMap<String, (String, String)>,
}

impl ColumnScope {
    pub fn new(base: impl Into<String>, exposed: &[String], base_columns: &[String]) -> Self {
        Self {
            base: base.into(),
            exposed: exposed.to_vec(),
            base_columns: base_columns.to_vec(),
            joined: HashMap::new(),
        }
    }

    /// Register a column selected from a joined table under `output` name.
    pub fn add_joined(&mut self, output: &str, table: &str, column: &str) {
        self.joined
            .entry(output.to_string())
            .or_insert_with(|| (table.to_string(), column.to_string()));
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn base_columns(&self) -> &[String] {
        &self.base_columns
    }

    pub fn is_exposed(&self, name: &str) -> bool {
        self.exposed.iter().any(|c| c == name)
    }

    /// Whether `name` is structurally present on the base relation.
    pub fn in_base_schema(&self, name: &str) -> bool {
        let column = match split_qualified(name) {
            Some((table, column)) if table == self.base => column,
            Some(_) => return false,
            None => name,
        };
        self.base_columns.iter().any(|c| c == column)
    }

    /// Per-column search targets: safe and whitelisted verbatim.
    pub fn accepts_for_search(&self, name: &str) -> bool {
        is_safe_identifier(name) && !is_pseudo_column(name) && self.is_exposed(name)
    }

    /// Order and dynamic filter targets: safe, not a pseudo-column, and either
    /// whitelisted or present on the base schema.
    pub fn accepts_for_order(&self, name: &str) -> bool {
        is_safe_identifier(name)
            && !is_pseudo_column(name)
            && (self.is_exposed(name) || self.in_base_schema(name))
    }

    /// Whitelisted columns eligible for global search, in whitelist order.
    pub fn searchable_columns(&self) -> impl Iterator<Item = &str> {
        self.exposed
            .iter()
            .map(String::as_str)
            .filter(|c| is_safe_identifier(c) && !is_pseudo_column(c))
    }

    /// Qualified column expression for an accepted name.
    pub fn expr(&self, name: &str) -> SqlExpr {
        if let Some((table, column)) = split_qualified(name) {
            return SqlExpr::column(Some(table), column);
        }
        if self.base_columns.iter().any(|c| c == name) {
            return SqlExpr::column(Some(&self.base), name);
        }
        if let Some((table, column)) = self.joined.get(name) {
            return SqlExpr::column(Some(table), column);
        }
        SqlExpr::column(Some(&self.base), name)
    }
}
