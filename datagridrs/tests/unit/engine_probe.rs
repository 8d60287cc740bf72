use std::sync::Arc;

use datagrid::config::DatagridConfig;
use datagrid::descriptor::ColumnDescriptor;
use datagrid::engine::{QueryEngine, Stage};
use datagrid::request::RequestParams;

use crate::support::{manager_with_config, FakeConnection};

fn debug_config(default: &str) -> DatagridConfig {
    let mut config = DatagridConfig::default();
    config.connections.default = default.to_string();
    config.engine.debug = true;
    config
}

#[tokio::test]
async fn failing_declared_connection_falls_back_to_default() {
    let mut reports = FakeConnection::users();
    reports.probe_ok = false;
    let reports = Arc::new(reports);
    let mysql = Arc::new(FakeConnection::users());
    let manager = manager_with_config(
        vec![("mysql_reports", reports.clone()), ("mysql", mysql.clone())],
        debug_config("mysql"),
    );
    let descriptor = ColumnDescriptor::table("users")
        .with_columns(["id", "name"])
        .with_connection("mysql_reports");

    let response = QueryEngine::new(&manager)
        .run(&descriptor, &RequestParams::default())
        .await;

    assert_eq!(response.records_total, 3);
    assert_eq!(response.data.len(), 3);
    let debug = response.debug.unwrap();
    assert_eq!(debug.connection.as_deref(), Some("mysql"));
    assert!(debug.failures.is_empty());
    assert!(debug.fell_back);
    assert_eq!(debug.probe_failures.len(), 1);
    assert_eq!(debug.probe_failures[0].connection, "mysql_reports");
    // only the probe reached the failing connection
    assert_eq!(reports.statements().len(), 1);
    assert!(mysql.counts() >= 1);
}

#[tokio::test]
async fn no_reachable_connection_yields_zeroed_response() {
    let mut a = FakeConnection::users();
    a.probe_ok = false;
    let mut b = FakeConnection::users();
    b.probe_ok = false;
    let manager = manager_with_config(
        vec![("a", Arc::new(a)), ("b", Arc::new(b))],
        debug_config("a"),
    );
    let descriptor = ColumnDescriptor::table("users").with_columns(["id", "name"]);

    let response = QueryEngine::new(&manager)
        .run(&descriptor, &RequestParams::from_pairs([("draw", "9")]))
        .await;

    assert_eq!(response.draw, 9);
    assert_eq!(response.records_total, 0);
    assert_eq!(response.records_filtered, 0);
    assert!(response.data.is_empty());
    let failures = response.debug.unwrap().failures;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, Stage::VerifyConnection);
}

#[tokio::test]
async fn debug_channel_is_off_by_default() {
    let manager = manager_with_config(
        vec![("default", Arc::new(FakeConnection::users()))],
        DatagridConfig::default(),
    );
    let descriptor = ColumnDescriptor::table("users").with_columns(["id"]);
    let response = QueryEngine::new(&manager)
        .run(&descriptor, &RequestParams::default())
        .await;
    assert!(response.debug.is_none());
    let json = serde_json::to_value(&response).unwrap();
    assert!(json.get("debug").is_none());
}

#[tokio::test]
async fn declared_connection_reports_no_fallback() {
    let mut config = DatagridConfig::default();
    config.engine.debug = true;
    let manager = manager_with_config(vec![("default", Arc::new(FakeConnection::users()))], config);
    let descriptor = ColumnDescriptor::table("users").with_columns(["id"]);
    let response = QueryEngine::new(&manager)
        .run(&descriptor, &RequestParams::default())
        .await;
    let debug = response.debug.unwrap();
    assert!(!debug.fell_back);
    let json = serde_json::to_value(&debug).unwrap();
    assert!(json.get("probe_failures").is_none());
}
