//! Per-request query planning.
//!
//! Everything in here is synchronous and side-effect free except
//! [`resolve::load_base_schema`] and [`probe::verify_connection`]; the engine
//! performs the I/O and feeds the results into [`build_query`].

use std::collections::HashMap;

use crate::config::DatagridConfig;
use crate::descriptor::ColumnDescriptor;
use crate::pagination::PageWindow;
use crate::request::RequestParams;

pub mod columns;
pub mod filters;
pub mod joins;
pub mod order;
pub mod plan;
pub mod probe;
pub mod resolve;
pub mod search;

pub use columns::{is_pseudo_column, is_row_index_column, is_safe_identifier, row_key, ColumnScope};
pub use plan::{ColumnRef, ResolvedQuery};
pub use probe::{verify_connection, ProbeOutcome};
pub use resolve::{connection_for, load_base_schema, resolve_table, ResolvedTable};

/// Schema facts gathered by the engine before planning.
#[derive(Debug, Clone, Default)]
pub struct SchemaFacts {
    pub base_columns: Vec<String>,
    /// Columns of each joined table; tables whose introspection failed are absent.
    pub joined_columns: HashMap<String, Vec<String>>,
}

/// Tables the descriptor's joins pull in, in join order.
pub fn joined_tables(descriptor: &ColumnDescriptor, base: &str) -> Vec<String> {
    let (edges, _) = joins::plan_edges(base, &descriptor.joins);
    edges.into_iter().map(|edge| edge.table).collect()
}

/// Assemble the validated query for one request.
pub fn build_query(
    descriptor: &ColumnDescriptor,
    request: &RequestParams,
    table: &ResolvedTable,
    connection: &str,
    facts: &SchemaFacts,
    config: &DatagridConfig,
) -> ResolvedQuery {
    let base = table.relation.as_str();
    let mut scope = ColumnScope::new(base, &descriptor.columns, &facts.base_columns);

    let (edges, rejected) = joins::plan_edges(base, &descriptor.joins);
    for join in &rejected {
        tracing::warn!(
            table = %descriptor.name,
            left = %join.left,
            right = %join.right,
            reason = join.reason,
            "skipping join"
        );
    }
    let join_plan = joins::build_join_plan(base, &edges, &facts.joined_columns, &mut scope);

    let search = search::translate(&scope, request);
    let static_conditions = filters::apply_static(&scope, &descriptor.conditions);
    let dynamic = filters::apply_dynamic(
        &scope,
        &request.filters,
        config.compat.duplicate_filter_policy,
    );
    let order = order::plan(&scope, request);

    let mut dropped = Vec::new();
    dropped.extend(search.dropped.iter().cloned());
    dropped.extend(dynamic.dropped.iter().cloned());
    dropped.extend(order.dropped.iter().cloned());

    ResolvedQuery {
        connection: connection.to_string(),
        relation: base.to_string(),
        from: table.from.clone(),
        joins: join_plan.joins,
        select: join_plan.select,
        static_conditions: static_conditions.predicates,
        search: search.into_filters(),
        dynamic_filters: dynamic.predicates,
        order_by: order.items,
        window: PageWindow::from_request(
            request.start,
            request.length,
            config.query.max_page_length,
        ),
        dropped,
    }
}
