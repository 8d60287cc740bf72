//! End-to-end tests against a real DuckDB file.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use datagrid::backends::DuckDbConnection;
use datagrid::config::{DatagridConfig, DuckDbConfig};
use datagrid::descriptor::{ActionLink, ColumnDescriptor, FormatRule, TableSource};
use datagrid::registry::TableRegistry;
use datagrid::{ConnectionManager, DataTableService, RequestParams, StaticCondition, Validator};

const SEED: &str = r#"
CREATE TABLE roles (id INTEGER PRIMARY KEY, title VARCHAR);
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    name VARCHAR,
    email VARCHAR,
    role_id INTEGER,
    tenant_id INTEGER
);
INSERT INTO roles VALUES (1, 'admin'), (2, 'editor');
INSERT INTO users VALUES
    (1, 'alice', 'alice@example.com', 1, 1),
    (2, 'bob', 'bob@example.com', 2, 1),
    (3, 'carla', 'carla@example.com', 1, 1),
    (4, 'dave', 'dave@example.com', 2, 2);
"#;

fn seeded_db() -> (TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.duckdb");
    let conn = duckdb::Connection::open(&path).unwrap();
    conn.execute_batch(SEED).unwrap();
    drop(conn);
    (dir, path)
}

fn manager(path: &std::path::Path, tweak: impl FnOnce(&mut DatagridConfig)) -> ConnectionManager {
    let mut config = DatagridConfig::default();
    config.engine.debug = true;
    tweak(&mut config);
    let mut manager = ConnectionManager::with_config(config);
    // a single pooled handle keeps every statement on one database instance
    let duck = DuckDbConnection::with_config(path, &DuckDbConfig { max_concurrency: 1 });
    manager.insert("default", Arc::new(duck));
    manager
}

fn users_descriptor() -> ColumnDescriptor {
    ColumnDescriptor::table("users")
        .with_columns(["DT_RowIndex", "id", "name", "email", "roles.title", "action"])
        .with_join("users.role_id", "roles.id")
        .with_condition(StaticCondition::eq("tenant_id", 1))
        .with_action(ActionLink {
            label: "Edit".into(),
            href: "/users/{id}/edit".into(),
            class: Some("btn".into()),
        })
}

fn service(manager: ConnectionManager) -> DataTableService {
    DataTableService::new(TableRegistry::from_parts(vec![users_descriptor()]), manager)
}

#[tokio::test]
async fn search_is_tenant_scoped() {
    let (_dir, path) = seeded_db();
    let service = service(manager(&path, |c| c.compat.total_tracks_filters = false));

    let request = RequestParams::from_pairs([
        ("draw", "1"),
        ("difta[name]", "users"),
        ("search[value]", "ar"),
    ]);
    let response = service.handle(&request).await;

    assert_eq!(response.draw, 1);
    assert_eq!(response.records_total, 3);
    assert_eq!(response.records_filtered, 1);
    assert_eq!(response.data.len(), 1);
    assert_eq!(response.data[0]["name"], json!("carla"));
    assert!(response.debug.unwrap().failures.is_empty());
}

#[tokio::test]
async fn ordered_page_with_join_and_decorations() {
    let (_dir, path) = seeded_db();
    let service = service(manager(&path, |_| {}));

    let request = RequestParams::from_pairs([
        ("draw", "2"),
        ("difta[name]", "users"),
        ("start", "1"),
        ("length", "1"),
        ("columns[0][data]", "name"),
        ("order[0][column]", "0"),
        ("order[0][dir]", "desc"),
    ]);
    let response = service.handle(&request).await;

    // static condition present, so total tracks filtered
    assert_eq!(response.records_total, 3);
    assert_eq!(response.records_filtered, 3);
    assert_eq!(response.data.len(), 1);
    let row = &response.data[0];
    assert_eq!(row["name"], json!("bob"));
    assert_eq!(row["title"], json!("editor"));
    assert_eq!(row["roles_id"], json!(2));
    assert_eq!(row["DT_RowIndex"], json!(2));
    assert_eq!(
        row["action"],
        json!(r#"<a href="/users/2/edit" class="btn">Edit</a>"#)
    );
    assert_eq!(row["_row_attr"], json!({"data-id": "2"}));
}

#[tokio::test]
async fn raw_sql_source_is_paged_and_formatted() {
    let (_dir, path) = seeded_db();
    let descriptor = ColumnDescriptor::new(
        "role_counts",
        TableSource::RawSql {
            sql: "SELECT role_id AS id, COUNT(*) AS members FROM users GROUP BY role_id;".into(),
            alias: "role_counts".into(),
        },
    )
    .with_columns(["id", "members"])
    .with_format(
        "members",
        FormatRule {
            decimals: 1,
            ..FormatRule::default()
        },
    );
    let service = DataTableService::new(
        TableRegistry::from_parts(vec![descriptor]),
        manager(&path, |_| {}),
    );

    let response = service
        .handle(&RequestParams::from_pairs([("difta[name]", "role_counts")]))
        .await;

    assert_eq!(response.records_total, 2);
    assert_eq!(response.data.len(), 2);
    assert_eq!(response.data[0]["id"], json!(1));
    assert_eq!(response.data[0]["members"], json!("2.0"));
    assert!(response.debug.unwrap().failures.is_empty());
}

#[tokio::test]
async fn get_and_post_bodies_agree() {
    let (_dir, path) = seeded_db();
    let service = service(manager(&path, |_| {}));

    let get = RequestParams::from_pairs([
        ("draw", "5"),
        ("difta[name]", "users"),
        ("length", "2"),
        ("search[value]", "o"),
        ("columns[0][data]", "email"),
        ("order[0][column]", "0"),
        ("order[0][dir]", "asc"),
    ]);
    let post = RequestParams::from_json(&json!({
        "draw": 5,
        "difta": {"name": "users"},
        "length": 2,
        "search": {"value": "o"},
        "columns": [{"data": "email"}],
        "order": [{"column": 0, "dir": "asc"}]
    }))
    .unwrap();
    assert_eq!(get, post);

    let from_get = service.handle(&get).await;
    let from_post = service.handle(&post).await;
    assert_eq!(from_get, from_post);
    assert_eq!(from_get.data.len(), 2);
}

#[tokio::test]
async fn validator_checks_descriptors_against_live_schema() {
    let (_dir, path) = seeded_db();
    let manager = manager(&path, |_| {});
    let validator = Validator::new(manager.clone(), false);

    validator
        .validate_descriptor(&users_descriptor())
        .await
        .unwrap();

    let broken = ColumnDescriptor::table("users").with_columns(["id", "nickname"]);
    assert!(validator.validate_descriptor(&broken).await.is_err());

    // clones share the pooled DuckDB handle
    let lenient = Validator::new(manager, true);
    lenient.validate_descriptor(&broken).await.unwrap();
}
