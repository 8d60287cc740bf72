use std::sync::Arc;

use datagrid::config::DatagridConfig;
use datagrid::descriptor::{ColumnDescriptor, StaticCondition};
use datagrid::engine::QueryEngine;
use datagrid::request::RequestParams;

use crate::support::{manager_with, manager_with_config, FakeConnection};

fn users() -> ColumnDescriptor {
    ColumnDescriptor::table("users").with_columns(["DT_RowIndex", "id", "name", "email"])
}

fn request(pairs: &[(&str, &str)]) -> RequestParams {
    RequestParams::from_pairs(pairs.iter().copied())
}

#[tokio::test]
async fn search_narrows_filtered_but_not_total() {
    let mut fake = FakeConnection::users();
    fake.filtered = 1;
    let conn = Arc::new(fake);
    let manager = manager_with(vec![("default", conn.clone())], "default");

    let response = QueryEngine::new(&manager)
        .run(&users(), &request(&[("draw", "5"), ("search[value]", "ali")]))
        .await;

    assert_eq!(response.draw, 5);
    assert_eq!(response.records_total, 3);
    assert_eq!(response.records_filtered, 1);
    assert_eq!(conn.counts(), 2);
}

#[tokio::test]
async fn dynamic_filter_makes_total_track_filtered() {
    let mut fake = FakeConnection::users();
    fake.filtered = 2;
    let conn = Arc::new(fake);
    let manager = manager_with(vec![("default", conn.clone())], "default");

    let response = QueryEngine::new(&manager)
        .run(&users(), &request(&[("name", "bob")]))
        .await;

    assert_eq!(response.records_total, response.records_filtered);
    assert_eq!(response.records_filtered, 2);
    assert_eq!(conn.counts(), 1);
}

#[tokio::test]
async fn compat_flag_off_reports_true_total() {
    let mut fake = FakeConnection::users();
    fake.filtered = 2;
    let conn = Arc::new(fake);
    let mut config = DatagridConfig::default();
    config.compat.total_tracks_filters = false;
    config.engine.concurrent_counts = false;
    let manager = manager_with_config(vec![("default", conn.clone())], config);

    let response = QueryEngine::new(&manager)
        .run(&users(), &request(&[("name", "bob")]))
        .await;

    assert_eq!(response.records_total, 3);
    assert_eq!(response.records_filtered, 2);
    assert_eq!(conn.counts(), 2);
}

#[tokio::test]
async fn static_conditions_also_couple_counts() {
    let mut fake = FakeConnection::users();
    fake.filtered = 2;
    let conn = Arc::new(fake);
    let manager = manager_with(vec![("default", conn.clone())], "default");
    let descriptor = users().with_condition(StaticCondition::eq("role_id", 1));

    let response = QueryEngine::new(&manager)
        .run(&descriptor, &RequestParams::default())
        .await;

    assert_eq!(response.records_total, 2);
    assert_eq!(response.records_filtered, 2);
    let count_sql = conn
        .statements()
        .into_iter()
        .find(|sql| sql.contains("COUNT(*)"))
        .unwrap();
    assert!(count_sql.contains(r#"("users"."role_id" = 1)"#));
}

#[tokio::test]
async fn empty_filtered_count_skips_fetch() {
    let mut fake = FakeConnection::users();
    fake.filtered = 0;
    let conn = Arc::new(fake);
    let manager = manager_with(vec![("default", conn.clone())], "default");

    let response = QueryEngine::new(&manager)
        .run(&users(), &request(&[("search[value]", "zzz")]))
        .await;

    assert!(response.data.is_empty());
    assert!(conn
        .statements()
        .iter()
        .all(|sql| !sql.contains("LIMIT 10")));
}

#[tokio::test]
async fn paging_window_and_row_index() {
    let conn = Arc::new(FakeConnection::users());
    let manager = manager_with(vec![("default", conn.clone())], "default");

    let response = QueryEngine::new(&manager)
        .run(&users(), &request(&[("start", "20"), ("length", "3")]))
        .await;

    let select = conn.statements().pop().unwrap();
    assert!(select.ends_with("LIMIT 3 OFFSET 20"), "{select}");
    let ordinals: Vec<u64> = response
        .data
        .iter()
        .map(|row| row["DT_RowIndex"].as_u64().unwrap())
        .collect();
    assert_eq!(ordinals, vec![21, 22, 23]);
    assert_eq!(response.data[0]["_row_attr"]["data-id"], "1");
}

#[tokio::test]
async fn length_minus_one_fetches_everything() {
    let conn = Arc::new(FakeConnection::users());
    let manager = manager_with(vec![("default", conn.clone())], "default");

    QueryEngine::new(&manager)
        .run(&users(), &request(&[("length", "-1")]))
        .await;

    let select = conn.statements().pop().unwrap();
    assert!(!select.contains("LIMIT"), "{select}");
    assert!(select.contains("ORDER BY"), "{select}");
}
