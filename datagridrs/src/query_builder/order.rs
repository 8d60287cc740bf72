use crate::request::RequestParams;
use crate::sql_ast::{OrderItem, SortDirection};

use super::columns::ColumnScope;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPlan {
    pub items: Vec<OrderItem>,
    /// Column names in ORDER BY position.
    pub columns: Vec<String>,
    /// True when no requested spec survived and the default chain was used.
    pub fallback: bool,
    pub dropped: Vec<String>,
}

/// Map request order specs onto validated ORDER BY items.
///
/// Without any valid spec the plan falls back, ascending, to the first
/// orderable request column, then the first exposed column, then the base
/// schema's `id`, then its first column. Only a relation with no known
/// columns at all yields an empty ORDER BY.
pub fn plan(scope: &ColumnScope, request: &RequestParams) -> OrderPlan {
    let mut out = OrderPlan::default();

    for spec in &request.order {
        let Some(column) = request.columns.get(spec.column) else {
            out.dropped.push(format!("#{}", spec.column));
            continue;
        };
        let name = column.column_ref();
        if !column.orderable || !scope.accepts_for_order(name) {
            tracing::debug!(column = %name, "dropping order spec");
            out.dropped.push(name.to_string());
            continue;
        }
        push(&mut out, scope, name, spec.dir);
    }

    if out.items.is_empty() {
        out.fallback = true;
        if let Some(name) = fallback_column(scope, request) {
            push(&mut out, scope, &name, SortDirection::Asc);
        }
    }
    out
}

fn push(out: &mut OrderPlan, scope: &ColumnScope, name: &str, direction: SortDirection) {
    if out.columns.iter().any(|c| c == name) {
        return;
    }
    out.items.push(OrderItem {
        expr: scope.expr(name),
        direction,
    });
    out.columns.push(name.to_string());
}

fn fallback_column(scope: &ColumnScope, request: &RequestParams) -> Option<String> {
    request
        .columns
        .iter()
        .filter(|c| c.orderable)
        .map(|c| c.column_ref())
        .find(|name| scope.accepts_for_order(name))
        .or_else(|| scope.searchable_columns().next())
        .map(str::to_string)
        .or_else(|| {
            scope
                .base_columns()
                .iter()
                .find(|c| *c == "id")
                .or_else(|| scope.base_columns().first())
                .cloned()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ColumnParam, OrderParam};
    use crate::sql_ast::SqlExpr;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn request(columns: &[&str], order: &[(usize, SortDirection)]) -> RequestParams {
        RequestParams {
            columns: columns.iter().map(|c| ColumnParam::new(*c)).collect(),
            order: order
                .iter()
                .map(|(column, dir)| OrderParam {
                    column: *column,
                    dir: *dir,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn multi_key_order_in_request_sequence() {
        let scope = ColumnScope::new("users", &names(&["id", "name", "email"]), &names(&["id", "name", "email"]));
        let req = request(
            &["id", "name", "email"],
            &[(2, SortDirection::Desc), (1, SortDirection::Asc), (2, SortDirection::Asc)],
        );
        let plan = plan(&scope, &req);
        assert!(!plan.fallback);
        assert_eq!(plan.columns, vec!["email", "name"]);
        assert_eq!(plan.items[0].direction, SortDirection::Desc);
        assert_eq!(plan.items[0].expr, SqlExpr::column(Some("users"), "email"));
    }

    #[test]
    fn row_index_order_falls_back() {
        let scope = ColumnScope::new(
            "users",
            &names(&["DT_RowIndex", "name", "email"]),
            &names(&["id", "name", "email"]),
        );
        let req = request(&["DT_RowIndex", "name"], &[(0, SortDirection::Desc)]);
        let plan = plan(&scope, &req);
        assert!(plan.fallback);
        assert_eq!(plan.dropped, vec!["DT_RowIndex"]);
        assert_eq!(plan.columns, vec!["name"]);
        assert_eq!(plan.items[0].direction, SortDirection::Asc);
    }

    #[test]
    fn schema_column_outside_whitelist_is_orderable() {
        let scope = ColumnScope::new("users", &names(&["name"]), &names(&["id", "name", "created_at"]));
        let req = request(&["name", "created_at", "nope"], &[(2, SortDirection::Asc), (1, SortDirection::Desc)]);
        let plan = plan(&scope, &req);
        assert_eq!(plan.columns, vec!["created_at"]);
        assert_eq!(plan.dropped, vec!["nope"]);
    }

    #[test]
    fn non_orderable_request_column_is_rejected() {
        let scope = ColumnScope::new("users", &names(&["name", "email"]), &names(&["name", "email"]));
        let mut req = request(&["name", "email"], &[(0, SortDirection::Desc)]);
        req.columns[0].orderable = false;
        let plan = plan(&scope, &req);
        assert!(plan.fallback);
        assert_eq!(plan.columns, vec!["email"]);
    }

    #[test]
    fn fallback_chain_reaches_schema() {
        let req = request(&[], &[]);

        let scope = ColumnScope::new("t", &names(&["action"]), &names(&["code", "id"]));
        assert_eq!(plan(&scope, &req).columns, vec!["id"]);

        let scope = ColumnScope::new("t", &[], &names(&["code", "label"]));
        assert_eq!(plan(&scope, &req).columns, vec!["code"]);

        let scope = ColumnScope::new("t", &[], &[]);
        let empty = plan(&scope, &req);
        assert!(empty.fallback);
        assert!(empty.items.is_empty());
    }
}
