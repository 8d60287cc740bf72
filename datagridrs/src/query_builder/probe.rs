//! `LIMIT 1` connection probing with fallback across configured connections.

use crate::backends::ConnectionManager;
use crate::error::{DatagridError, Result};
use crate::executor::{run_sql, Deadline};
use crate::sql_ast::SqlRenderer;

use super::resolve::ResolvedTable;

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    /// Connection that answered the probe.
    pub connection: String,
    pub fell_back: bool,
    /// `(connection, error)` for every failed attempt, in order.
    pub failures: Vec<(String, String)>,
}

/// Verify the resolved connection can read the base relation. When it cannot,
/// try every other registered connection in probe order and adopt the first
/// that answers. Gives up once the deadline is spent.
pub async fn verify_connection(
    manager: &ConnectionManager,
    table: &ResolvedTable,
    deadline: &Deadline,
) -> Result<ProbeOutcome> {
    let preferred = table.connection.as_str();
    let mut candidates = vec![preferred.to_string()];
    candidates.extend(
        manager
            .probe_order()
            .into_iter()
            .filter(|name| name != preferred),
    );

    let mut failures = Vec::new();
    for name in candidates {
        if deadline.is_expired() {
            failures.push((name, "request deadline exhausted".to_string()));
            break;
        }
        let Some(conn) = manager.get(&name) else {
            tracing::debug!(connection = %name, "connection not registered");
            failures.push((name, "not registered".to_string()));
            continue;
        };
        let budget = deadline.budget(manager.config_for(&name).query.probe_timeout_ms);
        let sql = SqlRenderer::new(conn.dialect()).render_probe(&table.from);
        match run_sql(conn.as_ref(), &sql, budget).await {
            Ok(_) => {
                let fell_back = name != preferred;
                if fell_back {
                    tracing::info!(
                        table = %table.relation,
                        from = %preferred,
                        to = %name,
                        "probe failed on declared connection, serving from fallback"
                    );
                }
                return Ok(ProbeOutcome {
                    connection: name,
                    fell_back,
                    failures,
                });
            }
            Err(e) => {
                tracing::warn!(table = %table.relation, connection = %name, error = %e, "probe failed");
                failures.push((name, e.to_string()));
            }
        }
    }

    let tried: Vec<&str> = failures.iter().map(|(name, _)| name.as_str()).collect();
    Err(DatagridError::Execution(format!(
        "no connection could read '{}' (tried {})",
        table.relation,
        tried.join(", ")
    )))
}
