use std::collections::{BTreeMap, HashMap};

use crate::sql_ast::{Join, SelectItem, SqlBinaryOperator, SqlExpr, TableRef};

use super::columns::{is_safe_identifier, split_qualified, ColumnScope};

/// One LEFT JOIN: `table` is the newly joined relation, `existing` the side
/// already reachable from the base.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinEdge {
    pub table: String,
    pub existing: (String, String),
    pub joined: (String, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedJoin {
    pub left: String,
    pub right: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct JoinPlan {
    pub joins: Vec<Join>,
    pub select: Vec<SelectItem>,
}

type Side<'a> = (&'a str, &'a str);

/// Order the declared join pairs so every join only references relations
/// that are already in scope. Pairs that are malformed, unreachable from the
/// base, or would close a cycle are returned as rejected.
pub fn plan_edges(
    base: &str,
    joins: &BTreeMap<String, String>,
) -> (Vec<JoinEdge>, Vec<RejectedJoin>) {
    let mut rejected = Vec::new();
    let mut pending: Vec<(&str, &str, Side, Side)> = Vec::new();
    for (left, right) in joins {
        match (parse_side(left), parse_side(right)) {
            (Some(l), Some(r)) => pending.push((left, right, l, r)),
            _ => rejected.push(RejectedJoin {
                left: left.clone(),
                right: right.clone(),
                reason: "join keys must be safe table.column references",
            }),
        }
    }

    let mut in_scope: Vec<String> = vec![base.to_string()];
    let mut edges = Vec::new();
    loop {
        let before = pending.len();
        pending.retain(|(left, right, l, r)| {
            let l_in = in_scope.iter().any(|t| t == l.0);
            let r_in = in_scope.iter().any(|t| t == r.0);
            let (existing, joined) = match (l_in, r_in) {
                (true, false) => (l, r),
                (false, true) => (r, l),
                (true, true) => {
                    rejected.push(RejectedJoin {
                        left: left.to_string(),
                        right: right.to_string(),
                        reason: "both sides already joined (cycle)",
                    });
                    return false;
                }
                (false, false) => return true,
            };
            in_scope.push(joined.0.to_string());
            edges.push(JoinEdge {
                table: joined.0.to_string(),
                existing: (existing.0.to_string(), existing.1.to_string()),
                joined: (joined.0.to_string(), joined.1.to_string()),
            });
            false
        });
        if pending.len() == before {
            break;
        }
    }
    for (left, right, _, _) in pending {
        rejected.push(RejectedJoin {
            left: left.to_string(),
            right: right.to_string(),
            reason: "neither side is reachable from the base table",
        });
    }
    (edges, rejected)
}

fn parse_side(raw: &str) -> Option<Side<'_>> {
    let raw = raw.trim();
    if !is_safe_identifier(raw) {
        return None;
    }
    split_qualified(raw)
}

/// Build LEFT JOIN clauses and the select list. The base contributes `base.*`;
/// each joined table contributes its listed columns, with `id` aliased to
/// `{table}_id`. Tables missing from `columns_by_table` (introspection failed)
/// are still joined but add no columns.
pub fn build_join_plan(
    base: &str,
    edges: &[JoinEdge],
    columns_by_table: &HashMap<String, Vec<String>>,
    scope: &mut ColumnScope,
) -> JoinPlan {
    let mut plan = JoinPlan {
        joins: Vec::with_capacity(edges.len()),
        select: vec![SelectItem {
            expr: SqlExpr::Wildcard {
                table: Some(base.to_string()),
            },
            alias: None,
        }],
    };

    for edge in edges {
        plan.joins.push(Join {
            table: TableRef {
                name: edge.table.clone(),
                alias: None,
                subquery: None,
            },
            on: vec![SqlExpr::binary(
                SqlBinaryOperator::Eq,
                SqlExpr::column(Some(&edge.existing.0), &edge.existing.1),
                SqlExpr::column(Some(&edge.joined.0), &edge.joined.1),
            )],
        });

        let Some(columns) = columns_by_table.get(&edge.table) else {
            tracing::debug!(table = %edge.table, "joined table contributes no columns");
            continue;
        };
        for column in columns {
            let alias = (column == "id").then(|| format!("{}_id", edge.table));
            let output = alias.clone().unwrap_or_else(|| column.clone());
            scope.add_joined(&output, &edge.table, column);
            plan.select.push(SelectItem {
                expr: SqlExpr::column(Some(&edge.table), column),
                alias,
            });
        }
    }
    plan
}
