use std::sync::Arc;

use serde_json::json;

use datagrid::config::DatagridConfig;
use datagrid::descriptor::{ColumnDescriptor, FormatRule, TableSource};
use datagrid::engine::{QueryEngine, Stage};
use datagrid::request::RequestParams;

use crate::support::{manager_with_config, FakeConnection};

fn manager(conn: Arc<FakeConnection>) -> datagrid::backends::ConnectionManager {
    let mut config = DatagridConfig::default();
    config.engine.debug = true;
    manager_with_config(vec![("default", conn)], config)
}

#[tokio::test]
async fn failed_fetch_keeps_counts() {
    let mut fake = FakeConnection::users();
    fake.fail_fetch = true;
    let manager = manager(Arc::new(fake));
    let descriptor = ColumnDescriptor::table("users").with_columns(["id", "name"]);

    let response = QueryEngine::new(&manager)
        .run(&descriptor, &RequestParams::default())
        .await;

    assert_eq!(response.records_total, 3);
    assert!(response.data.is_empty());
    let failures = response.debug.unwrap().failures;
    assert_eq!(failures[0].stage, Stage::Fetch);
}

#[tokio::test]
async fn unknown_joined_table_still_serves_rows() {
    let manager = manager(Arc::new(FakeConnection::users()));
    let descriptor = ColumnDescriptor::table("users")
        .with_columns(["id", "name"])
        .with_join("users.team_id", "teams.id");

    let response = QueryEngine::new(&manager)
        .run(&descriptor, &RequestParams::default())
        .await;

    assert_eq!(response.data.len(), 3);
    let failures = response.debug.unwrap().failures;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, Stage::PlanJoins);
}

#[tokio::test]
async fn unsafe_table_name_degrades_to_empty() {
    let conn = Arc::new(FakeConnection::users());
    let manager = manager(conn.clone());
    let descriptor = ColumnDescriptor::new("evil", TableSource::Named("users;drop".into()));

    let response = QueryEngine::new(&manager)
        .run(&descriptor, &RequestParams::default())
        .await;

    assert_eq!(response.records_total, 0);
    assert_eq!(response.debug.unwrap().failures[0].stage, Stage::ResolveTable);
    assert!(conn.statements().is_empty());
}

#[tokio::test]
async fn bad_cell_does_not_spoil_the_row() {
    let manager = manager(Arc::new(FakeConnection::users()));
    let descriptor = ColumnDescriptor::table("users")
        .with_columns(["id", "name", "email"])
        .with_format("id", FormatRule::default())
        .with_format("name", FormatRule::default());

    let response = QueryEngine::new(&manager)
        .run(&descriptor, &RequestParams::default())
        .await;

    assert_eq!(response.data[0]["id"], json!("1.00"));
    assert_eq!(response.data[0]["name"], json!("alice"));
    let failures = response.debug.unwrap().failures;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, Stage::Format);
}

#[tokio::test]
async fn same_request_twice_is_identical() {
    let manager = manager(Arc::new(FakeConnection::users()));
    let descriptor = ColumnDescriptor::table("users").with_columns(["DT_RowIndex", "id", "name"]);
    let request = RequestParams::from_pairs([
        ("draw", "1"),
        ("search[value]", "a"),
        ("columns[0][data]", "name"),
        ("order[0][column]", "0"),
        ("order[0][dir]", "desc"),
    ]);

    let engine = QueryEngine::new(&manager);
    let first = engine.run(&descriptor, &request).await;
    let second = engine.run(&descriptor, &request).await;
    assert_eq!(first, second);
}
