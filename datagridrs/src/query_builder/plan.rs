//! Resolved query intermediate representation.
//!
//! A [`ResolvedQuery`] holds every validated piece of one request's query.
//! The engine renders three statements from it: the unfiltered COUNT, the
//! filtered COUNT and the paginated SELECT.

use serde::Serialize;

use crate::pagination::PageWindow;
use crate::sql_ast::{Join, OrderItem, SelectItem, SelectQuery, SqlExpr, TableRef};

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    pub connection: String,
    pub relation: String,
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub select: Vec<SelectItem>,
    /// Server-declared conditions; part of every statement.
    pub static_conditions: Vec<SqlExpr>,
    pub search: Vec<SqlExpr>,
    pub dynamic_filters: Vec<SqlExpr>,
    pub order_by: Vec<OrderItem>,
    pub window: PageWindow,
    /// Client references rejected while planning.
    pub dropped: Vec<String>,
}

impl ResolvedQuery {
    fn skeleton(&self) -> SelectQuery {
        SelectQuery {
            from: self.from.clone(),
            joins: self.joins.clone(),
            filters: self.static_conditions.clone(),
            ..Default::default()
        }
    }

    /// Base rows ignoring search and dynamic filters.
    pub fn unfiltered(&self) -> SelectQuery {
        self.skeleton()
    }

    /// Base rows after search and dynamic filters.
    pub fn filtered(&self) -> SelectQuery {
        let mut query = self.skeleton();
        query.filters.extend(self.search.iter().cloned());
        query.filters.extend(self.dynamic_filters.iter().cloned());
        query
    }

    /// The paginated, ordered page fetch.
    pub fn to_select(&self) -> SelectQuery {
        let mut query = self.filtered();
        query.select = self.select.clone();
        query.order_by = self.order_by.clone();
        query.limit = self.window.limit;
        query.offset = self.window.offset_sql();
        query
    }

    /// Whether static conditions or dynamic filters narrowed the rows.
    pub fn has_conditions(&self) -> bool {
        !self.static_conditions.is_empty() || !self.dynamic_filters.is_empty()
    }

    /// Every `(table, column)` the page fetch references, in clause order.
    pub fn referenced_columns(&self) -> Vec<ColumnRef> {
        let query = self.to_select();
        let mut refs = Vec::new();
        let mut push = |table: Option<&str>, name: &str| {
            refs.push(ColumnRef {
                table: table.map(str::to_string),
                name: name.to_string(),
            })
        };
        for item in &query.select {
            item.expr.for_each_column(&mut push);
        }
        for join in &query.joins {
            for on in &join.on {
                on.for_each_column(&mut push);
            }
        }
        for filter in &query.filters {
            filter.for_each_column(&mut push);
        }
        for order in &query.order_by {
            order.expr.for_each_column(&mut push);
        }
        refs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}
