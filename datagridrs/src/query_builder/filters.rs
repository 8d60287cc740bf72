use serde_json::Value;

use crate::config::DuplicateFilterPolicy;
use crate::descriptor::{ConditionOp, StaticCondition};
use crate::request::FilterEntry;
use crate::sql_ast::{SqlBinaryOperator, SqlExpr};

use super::columns::{is_safe_identifier, ColumnScope};

/// Predicates produced from static conditions or dynamic filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSet {
    pub predicates: Vec<SqlExpr>,
    /// Fields that produced a predicate.
    pub applied: Vec<String>,
    pub dropped: Vec<String>,
}

impl ConditionSet {
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

pub(crate) fn render_condition_expr(base_expr: SqlExpr, condition: &StaticCondition) -> SqlExpr {
    let negated = matches!(condition.op, ConditionOp::Neq | ConditionOp::NotIn);
    let set_op = matches!(condition.op, ConditionOp::In | ConditionOp::NotIn);

    if let Value::Array(items) = &condition.value {
        return SqlExpr::InList {
            expr: Box::new(base_expr),
            list: items.iter().map(|v| SqlExpr::Literal(v.clone())).collect(),
            negated,
        };
    }
    if condition.value.is_null() {
        return SqlExpr::IsNull {
            expr: Box::new(base_expr),
            negated,
        };
    }
    if set_op {
        return SqlExpr::InList {
            expr: Box::new(base_expr),
            list: vec![SqlExpr::Literal(condition.value.clone())],
            negated,
        };
    }

    let op = match condition.op {
        ConditionOp::Like => {
            let pattern = match &condition.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return SqlExpr::Like {
                expr: Box::new(SqlExpr::TextCast(Box::new(base_expr))),
                pattern,
            };
        }
        ConditionOp::Neq => SqlBinaryOperator::Neq,
        ConditionOp::Gt => SqlBinaryOperator::Gt,
        ConditionOp::Gte => SqlBinaryOperator::Gte,
        ConditionOp::Lt => SqlBinaryOperator::Lt,
        ConditionOp::Lte => SqlBinaryOperator::Lte,
        ConditionOp::Eq | ConditionOp::In | ConditionOp::NotIn => SqlBinaryOperator::Eq,
    };
    SqlExpr::binary(op, base_expr, SqlExpr::Literal(condition.value.clone()))
}

/// Server-declared conditions. These do not need to be exposed but their
/// field names must still be safe identifiers.
pub fn apply_static(scope: &ColumnScope, conditions: &[StaticCondition]) -> ConditionSet {
    let mut out = ConditionSet::default();
    for condition in conditions {
        let field = condition.field.trim();
        if !is_safe_identifier(field) {
            tracing::warn!(field = %field, "ignoring static condition with unsafe field name");
            out.dropped.push(field.to_string());
            continue;
        }
        out.predicates
            .push(render_condition_expr(scope.expr(field), condition));
        out.applied.push(field.to_string());
    }
    out
}

/// Client-supplied `field=value` filters. Repeated keys collapse according
/// to `policy`; a multi-valued entry (`field[]`) becomes an `IN` test. Fields
/// are accepted under the same rules as order columns.
pub fn apply_dynamic(
    scope: &ColumnScope,
    entries: &[FilterEntry],
    policy: DuplicateFilterPolicy,
) -> ConditionSet {
    let mut out = ConditionSet::default();

    let mut fields: Vec<&str> = Vec::new();
    for entry in entries {
        if !fields.contains(&entry.field.as_str()) {
            fields.push(&entry.field);
        }
    }

    for field in fields {
        let mut seen = entries.iter().filter(|e| e.field == field);
        let chosen = match policy {
            DuplicateFilterPolicy::LastWins => seen.last(),
            DuplicateFilterPolicy::FirstWins => seen.next(),
            DuplicateFilterPolicy::Reject => {
                let first = seen.next();
                if seen.next().is_some() {
                    tracing::warn!(field = %field, "rejecting duplicated dynamic filter");
                    out.dropped.push(field.to_string());
                    continue;
                }
                first
            }
        };
        let Some(entry) = chosen else {
            continue;
        };

        if !scope.accepts_for_order(field) {
            tracing::debug!(field = %field, "dropping dynamic filter on unknown column");
            out.dropped.push(field.to_string());
            continue;
        }

        let values: Vec<&str> = entry
            .values
            .iter()
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .collect();
        let predicate = match (entry.multi, values.as_slice()) {
            (_, []) => continue,
            (false, [.., last]) => SqlExpr::binary(
                SqlBinaryOperator::Eq,
                scope.expr(field),
                SqlExpr::Literal(Value::String(last.to_string())),
            ),
            (true, values) => SqlExpr::InList {
                expr: Box::new(scope.expr(field)),
                list: values
                    .iter()
                    .map(|v| SqlExpr::Literal(Value::String(v.to_string())))
                    .collect(),
                negated: false,
            },
        };
        out.predicates.push(predicate);
        out.applied.push(field.to_string());
    }
    out
}
