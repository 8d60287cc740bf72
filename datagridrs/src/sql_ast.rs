use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dialect::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Lenient parse of a client-supplied direction; anything but `desc` sorts ascending.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Column {
        table: Option<String>,
        name: String,
    },
    /// `table.*` or `*`.
    Wildcard {
        table: Option<String>,
    },
    Literal(Value),
    /// `COUNT(*)`.
    CountStar,
    /// Cast to the dialect's text type, used so LIKE works on any column type.
    TextCast(Box<SqlExpr>),
    BinaryOp {
        op: SqlBinaryOperator,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    /// `expr LIKE 'pattern' ESCAPE '\'`; the pattern is already escaped.
    Like {
        expr: Box<SqlExpr>,
        pattern: String,
    },
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },
    IsNull {
        expr: Box<SqlExpr>,
        negated: bool,
    },
}

impl SqlExpr {
    pub fn column(table: Option<&str>, name: &str) -> Self {
        SqlExpr::Column {
            table: table.map(str::to_string),
            name: name.to_string(),
        }
    }

    pub fn binary(op: SqlBinaryOperator, left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// OR-fold of `exprs`; `None` when empty.
    pub fn any(exprs: Vec<SqlExpr>) -> Option<SqlExpr> {
        exprs
            .into_iter()
            .reduce(|acc, e| SqlExpr::binary(SqlBinaryOperator::Or, acc, e))
    }

    /// Visit every column reference in the expression tree.
    pub fn for_each_column<'a>(&'a self, f: &mut impl FnMut(Option<&'a str>, &'a str)) {
        match self {
            SqlExpr::Column { table, name } => f(table.as_deref(), name),
            SqlExpr::Wildcard { .. } | SqlExpr::Literal(_) | SqlExpr::CountStar => {}
            SqlExpr::TextCast(inner) => inner.for_each_column(f),
            SqlExpr::BinaryOp { left, right, .. } => {
                left.for_each_column(f);
                right.for_each_column(f);
            }
            SqlExpr::Like { expr, .. } | SqlExpr::IsNull { expr, .. } => expr.for_each_column(f),
            SqlExpr::InList { expr, list, .. } => {
                expr.for_each_column(f);
                for item in list {
                    item.for_each_column(f);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlBinaryOperator {
    And,
    Or,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
    /// Raw SQL rendered as a derived table aliased `name`.
    pub subquery: Option<String>,
}

/// Always rendered as `LEFT JOIN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: TableRef,
    pub on: Vec<SqlExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: SqlExpr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub select: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub filters: Vec<SqlExpr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub struct SqlRenderer<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SqlRenderer<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn render_select(&self, query: &SelectQuery) -> String {
        let select_items: Vec<String> = query
            .select
            .iter()
            .map(|item| {
                let expr_sql = self.render_expr(&item.expr);
                match &item.alias {
                    Some(alias) => format!("{expr_sql} AS {}", self.dialect.quote_ident(alias)),
                    None => expr_sql,
                }
            })
            .collect();
        let select_sql = if select_items.is_empty() {
            "*".to_string()
        } else {
            select_items.join(", ")
        };

        let mut sql = format!("SELECT {select_sql}");
        self.push_from_where(&mut sql, query);

        if !query.order_by.is_empty() {
            let orders: Vec<String> = query
                .order_by
                .iter()
                .map(|o| {
                    let expr = self.render_expr(&o.expr);
                    let dir = match o.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{expr} {dir}")
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }

    /// `SELECT COUNT(*)` over the query's FROM/JOIN/WHERE, ignoring select list, order and paging.
    pub fn render_count(&self, query: &SelectQuery) -> String {
        let mut sql = format!(
            "SELECT {} AS {}",
            self.render_expr(&SqlExpr::CountStar),
            self.dialect.quote_ident("aggregate")
        );
        self.push_from_where(&mut sql, query);
        sql
    }

    /// Cheap existence check for a relation.
    pub fn render_probe(&self, table: &TableRef) -> String {
        format!("SELECT 1 FROM {} LIMIT 1", self.render_table_ref(table))
    }

    /// Zero-row select used to read the column names of a relation.
    pub fn render_shape(&self, table: &TableRef) -> String {
        format!("SELECT * FROM {} LIMIT 0", self.render_table_ref(table))
    }

    fn push_from_where(&self, sql: &mut String, query: &SelectQuery) {
        sql.push_str(&format!(" FROM {}", self.render_table_ref(&query.from)));

        for join in &query.joins {
            let on_clause: Vec<String> = join.on.iter().map(|e| self.render_expr(e)).collect();
            sql.push_str(&format!(
                " LEFT JOIN {} ON {}",
                self.render_table_ref(&join.table),
                on_clause.join(" AND ")
            ));
        }

        if !query.filters.is_empty() {
            let filters: Vec<String> = query.filters.iter().map(|f| self.render_expr(f)).collect();
            sql.push_str(&format!(" WHERE {}", filters.join(" AND ")));
        }
    }

    fn render_table_ref(&self, table: &TableRef) -> String {
        if let Some(subquery) = &table.subquery {
            return format!("({subquery}) AS {}", self.dialect.quote_ident(&table.name));
        }
        match &table.alias {
            Some(alias) => format!(
                "{} {}",
                self.dialect.qualify_table(&table.name),
                self.dialect.quote_ident(alias)
            ),
            None => self.dialect.qualify_table(&table.name),
        }
    }

    fn render_expr(&self, expr: &SqlExpr) -> String {
        match expr {
            SqlExpr::Column { table, name } => match table {
                Some(t) => format!(
                    "{}.{}",
                    self.dialect.qualify_table(t),
                    self.dialect.quote_ident(name)
                ),
                None => self.dialect.quote_ident(name),
            },
            SqlExpr::Wildcard { table } => match table {
                Some(t) => format!("{}.*", self.dialect.qualify_table(t)),
                None => "*".to_string(),
            },
            SqlExpr::Literal(v) => self.dialect.render_literal(v),
            SqlExpr::CountStar => "COUNT(*)".to_string(),
            SqlExpr::TextCast(inner) => self.dialect.render_text_cast(&self.render_expr(inner)),
            SqlExpr::BinaryOp { op, left, right } => {
                let op_sql = match op {
                    SqlBinaryOperator::And => "AND",
                    SqlBinaryOperator::Or => "OR",
                    SqlBinaryOperator::Eq => "=",
                    SqlBinaryOperator::Neq => "!=",
                    SqlBinaryOperator::Gt => ">",
                    SqlBinaryOperator::Gte => ">=",
                    SqlBinaryOperator::Lt => "<",
                    SqlBinaryOperator::Lte => "<=",
                };
                format!(
                    "({} {} {})",
                    self.render_expr(left),
                    op_sql,
                    self.render_expr(right)
                )
            }
            SqlExpr::Like { expr, pattern } => format!(
                "{} LIKE {} ESCAPE {}",
                self.render_expr(expr),
                self.dialect
                    .render_literal(&Value::String(pattern.clone())),
                self.dialect
                    .render_literal(&Value::String(crate::dialect::LIKE_ESCAPE.to_string()))
            ),
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    // `x IN ()` is not valid SQL; an empty set matches nothing.
                    return if *negated { "(1 = 1)" } else { "(1 = 0)" }.to_string();
                }
                let rendered_values: Vec<String> =
                    list.iter().map(|v| self.render_expr(v)).collect();
                let not_kw = if *negated { "NOT " } else { "" };
                format!(
                    "{} {}IN ({})",
                    self.render_expr(expr),
                    not_kw,
                    rendered_values.join(", ")
                )
            }
            SqlExpr::IsNull { expr, negated } => {
                let not_kw = if *negated { " NOT" } else { "" };
                format!("{} IS{not_kw} NULL", self.render_expr(expr))
            }
        }
    }
}
