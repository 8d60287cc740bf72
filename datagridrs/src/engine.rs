//! Query resolution pipeline.
//!
//! Stages run in order: resolve table, verify connection, load schema, plan
//! joins, count, fetch, format. Every stage returns `Result<T, StageError>`;
//! the engine folds a failed stage into that stage's empty value, logs it and
//! keeps going, so [`QueryEngine::run`] always yields a well-formed response.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backends::{BackendConnection, ConnectionManager};
use crate::config::DatagridConfig;
use crate::descriptor::ColumnDescriptor;
use crate::dialect::Dialect;
use crate::error::{DatagridError, Result};
use crate::executor::{run_sql, with_timeout, Deadline};
use crate::format::RowFormatter;
use crate::query_builder::{self, ResolvedQuery, SchemaFacts};
use crate::request::RequestParams;
use crate::query_builder::ProbeOutcome;
use crate::response::{Diagnostics, ProbeFailure, RowDecorator, TableResponse};
use crate::sql_ast::SqlRenderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ResolveTable,
    VerifyConnection,
    LoadSchema,
    PlanJoins,
    CountTotal,
    CountFiltered,
    Fetch,
    Format,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ResolveTable => "resolve_table",
            Stage::VerifyConnection => "verify_connection",
            Stage::LoadSchema => "load_schema",
            Stage::PlanJoins => "plan_joins",
            Stage::CountTotal => "count_total",
            Stage::CountFiltered => "count_filtered",
            Stage::Fetch => "fetch",
            Stage::Format => "format",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: DatagridError,
}

/// Serializable record of a folded [`StageError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

impl From<&StageError> for StageFailure {
    fn from(err: &StageError) -> Self {
        Self {
            stage: err.stage,
            message: err.source.to_string(),
        }
    }
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|source| StageError { stage, source })
    }
}

/// Collects folded stage errors for one request.
#[derive(Debug, Default)]
struct Failures(Vec<StageFailure>);

impl Failures {
    /// Fold a stage result into `default` on error.
    fn fold<T>(&mut self, table: &str, result: std::result::Result<T, StageError>, default: T) -> T {
        match result {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(table = %table, stage = %err.stage, error = %err.source, "stage failed, continuing with empty value");
                self.0.push(StageFailure::from(&err));
                default
            }
        }
    }

    fn fold_opt<T>(&mut self, table: &str, result: std::result::Result<T, StageError>) -> Option<T> {
        self.fold(table, result.map(Some), None)
    }
}

/// A planned query plus the probe that chose its connection.
struct Planned {
    query: ResolvedQuery,
    probe: ProbeOutcome,
}

/// The three statements a request runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedStatements {
    pub count_total: String,
    pub count_filtered: String,
    pub select: String,
}

pub fn render_statements(query: &ResolvedQuery, dialect: &dyn Dialect) -> RenderedStatements {
    let renderer = SqlRenderer::new(dialect);
    RenderedStatements {
        count_total: renderer.render_count(&query.unfiltered()),
        count_filtered: renderer.render_count(&query.filtered()),
        select: renderer.render_select(&query.to_select()),
    }
}

/// Stateless per-request orchestrator. Holds only borrowed, read-only
/// configuration and connections.
pub struct QueryEngine<'a> {
    connections: &'a ConnectionManager,
}

impl<'a> QueryEngine<'a> {
    pub fn new(connections: &'a ConnectionManager) -> Self {
        Self { connections }
    }

    fn config(&self) -> &DatagridConfig {
        self.connections.config()
    }

    async fn resolve_within(
        &self,
        descriptor: &ColumnDescriptor,
        request: &RequestParams,
        deadline: &Deadline,
        failures: &mut Failures,
    ) -> Option<Planned> {
        let name = descriptor.name.as_str();

        let table = failures.fold_opt(
            name,
            query_builder::resolve_table(descriptor, self.connections).at(Stage::ResolveTable),
        )?;

        let outcome = failures.fold_opt(
            name,
            query_builder::verify_connection(self.connections, &table, deadline)
                .await
                .at(Stage::VerifyConnection),
        )?;
        let conn = self.connection(&outcome.connection)?;
        let statement_ms = self.statement_timeout_ms(&outcome.connection);

        let base_schema = failures.fold(
            name,
            query_builder::load_base_schema(conn.as_ref(), &table, deadline.budget(statement_ms))
                .await
                .at(Stage::LoadSchema),
            Default::default(),
        );

        let mut joined_columns = HashMap::new();
        for joined in query_builder::joined_tables(descriptor, &table.relation) {
            let listed = with_timeout(deadline.budget(statement_ms), conn.list_columns(&joined))
                .await
                .at(Stage::PlanJoins);
            if let Some(columns) = failures.fold_opt(name, listed) {
                joined_columns.insert(joined, columns);
            }
        }

        let facts = SchemaFacts {
            base_columns: base_schema.column_names(),
            joined_columns,
        };
        let query = query_builder::build_query(
            descriptor,
            request,
            &table,
            &outcome.connection,
            &facts,
            self.config(),
        );
        Some(Planned {
            query,
            probe: outcome,
        })
    }

    /// Run the full pipeline. Never fails: every error degrades to a zeroed
    /// or partial response.
    pub async fn run(&self, descriptor: &ColumnDescriptor, request: &RequestParams) -> TableResponse {
        let started = Instant::now();
        let name = descriptor.name.as_str();
        let deadline = Deadline::after_ms(self.config().query.request_timeout_ms);
        let mut failures = Failures::default();

        let mut response = TableResponse::empty(request.draw);
        let planned = self
            .resolve_within(descriptor, request, &deadline, &mut failures)
            .await;

        if let Some(planned) = &planned {
            self.execute(
                descriptor,
                request,
                &planned.query,
                &deadline,
                &mut failures,
                &mut response,
            )
            .await;
        }

        tracing::info!(
            table = %name,
            ms = started.elapsed().as_millis() as u64,
            total = response.records_total,
            filtered = response.records_filtered,
            rows = response.data.len(),
            failures = failures.0.len(),
            "table request served"
        );

        if self.config().engine.debug {
            let mut debug = Diagnostics {
                failures: failures.0,
                ..Default::default()
            };
            if let Some(Planned { query, probe }) = planned {
                debug.connection = Some(query.connection);
                debug.dropped = query.dropped;
                debug.fell_back = probe.fell_back;
                debug.probe_failures = probe
                    .failures
                    .into_iter()
                    .map(|(connection, message)| ProbeFailure {
                        connection,
                        message,
                    })
                    .collect();
            }
            response.debug = Some(debug);
        }
        response
    }

    async fn execute(
        &self,
        descriptor: &ColumnDescriptor,
        request: &RequestParams,
        query: &ResolvedQuery,
        deadline: &Deadline,
        failures: &mut Failures,
        response: &mut TableResponse,
    ) {
        let name = descriptor.name.as_str();
        let Some(conn) = self.connection(&query.connection) else {
            return;
        };
        let conn = conn.as_ref();
        let statement_ms = self.statement_timeout_ms(&query.connection);
        let statements = render_statements(query, conn.dialect());

        let narrowed = !query.search.is_empty() || !query.dynamic_filters.is_empty();
        let total_tracks = self.config().compat.total_tracks_filters && query.has_conditions();

        let (total, filtered) = if !narrowed || total_tracks {
            // one count serves both numbers
            let sql = if narrowed {
                &statements.count_filtered
            } else {
                &statements.count_total
            };
            let count = self.count(conn, sql, deadline, statement_ms).await;
            (None, count.at(Stage::CountFiltered))
        } else if self.config().engine.concurrent_counts {
            let (total, filtered) = futures::join!(
                self.count(conn, &statements.count_total, deadline, statement_ms),
                self.count(conn, &statements.count_filtered, deadline, statement_ms),
            );
            (Some(total.at(Stage::CountTotal)), filtered.at(Stage::CountFiltered))
        } else {
            let total = self
                .count(conn, &statements.count_total, deadline, statement_ms)
                .await;
            let filtered = self
                .count(conn, &statements.count_filtered, deadline, statement_ms)
                .await;
            (Some(total.at(Stage::CountTotal)), filtered.at(Stage::CountFiltered))
        };

        let filtered = failures.fold_opt(name, filtered);
        response.records_filtered = filtered.unwrap_or(0);
        response.records_total = match total {
            Some(total) => failures.fold(name, total, 0),
            None => response.records_filtered,
        };

        if filtered == Some(0) || query.window.is_empty() {
            return;
        }

        let fetched = run_sql(conn, &statements.select, deadline.budget(statement_ms))
            .await
            .at(Stage::Fetch);
        let mut rows = failures.fold(name, fetched.map(|r| r.rows), Vec::new());

        let cell_failures = RowFormatter::new(&descriptor.formats).format_rows(&mut rows);
        if !cell_failures.is_empty() {
            let fields: Vec<&str> = cell_failures.iter().map(|f| f.field.as_str()).collect();
            let err = StageError {
                stage: Stage::Format,
                source: DatagridError::Validation(format!(
                    "{} cell(s) left unformatted ({})",
                    cell_failures.len(),
                    fields.join(", ")
                )),
            };
            failures.fold(name, Err::<(), _>(err), ());
        }

        RowDecorator::new(descriptor, request.start).decorate(&mut rows);
        response.data = rows;
    }

    async fn count(
        &self,
        conn: &dyn BackendConnection,
        sql: &str,
        deadline: &Deadline,
        statement_ms: u64,
    ) -> Result<u64> {
        run_sql(conn, sql, deadline.budget(statement_ms))
            .await?
            .scalar_count()
    }

    fn connection(&self, name: &str) -> Option<&'a std::sync::Arc<dyn BackendConnection>> {
        let conn = self.connections.get(name);
        if conn.is_none() {
            tracing::warn!(connection = %name, "connection vanished after probing");
        }
        conn
    }

    fn statement_timeout_ms(&self, connection: &str) -> u64 {
        self.connections
            .config_for(connection)
            .query
            .statement_timeout_ms
    }
}
