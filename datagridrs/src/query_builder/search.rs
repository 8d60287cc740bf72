use crate::dialect::escape_like;
use crate::request::RequestParams;
use crate::sql_ast::SqlExpr;

use super::columns::ColumnScope;

/// Search predicates for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPredicates {
    /// OR-group of the global term across searchable columns.
    pub global: Option<SqlExpr>,
    /// Per-column terms; each narrows the result (ANDed).
    pub columns: Vec<SqlExpr>,
    /// Column references that were rejected.
    pub dropped: Vec<String>,
}

impl SearchPredicates {
    pub fn into_filters(self) -> Vec<SqlExpr> {
        self.global.into_iter().chain(self.columns).collect()
    }
}

fn contains(scope: &ColumnScope, column: &str, term: &str) -> SqlExpr {
    SqlExpr::Like {
        expr: Box::new(SqlExpr::TextCast(Box::new(scope.expr(column)))),
        pattern: format!("%{}%", escape_like(term)),
    }
}

/// Translate global and per-column search terms into predicates restricted to
/// the scope's whitelist. Columns the request marks `searchable=false` are
/// left out of the global group too.
pub fn translate(scope: &ColumnScope, request: &RequestParams) -> SearchPredicates {
    let mut out = SearchPredicates::default();

    let opted_out: Vec<&str> = request
        .columns
        .iter()
        .filter(|c| !c.searchable)
        .map(|c| c.column_ref())
        .filter(|c| !c.is_empty())
        .collect();

    let term = request.global_search();
    if !term.is_empty() {
        let group: Vec<SqlExpr> = scope
            .searchable_columns()
            .filter(|c| !opted_out.contains(c))
            .map(|c| contains(scope, c, term))
            .collect();
        out.global = SqlExpr::any(group);
    }

    for column in &request.columns {
        let term = column.search.value.trim();
        if term.is_empty() || !column.searchable {
            continue;
        }
        let name = column.column_ref();
        if scope.accepts_for_search(name) {
            out.columns.push(contains(scope, name, term));
        } else {
            tracing::debug!(column = %name, "dropping per-column search on unexposed column");
            out.dropped.push(name.to_string());
        }
    }
    out
}
