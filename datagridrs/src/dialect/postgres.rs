//! PostgreSQL dialect implementation.

use super::Dialect;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn render_text_cast(&self, expr: &str) -> String {
        format!("CAST({expr} AS TEXT)")
    }
}
