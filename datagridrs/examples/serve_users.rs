use std::sync::Arc;
use std::{fs, path::Path};

use datagrid::{
    backends::DuckDbConnection, config::DuckDbConfig, registry::TableRegistry, AjaxOptions, ConnectionManager,
    DataTableService, DatagridConfig, RequestParams, Transport, Validator,
};
use tracing_subscriber::EnvFilter;

const USERS_YAML: &str = r#"
name: users
source: users
columns: [DT_RowIndex, name, email, roles.title, action]
joins:
  users.role_id: roles.id
conditions:
  - field: active
    value: true
actions:
  - label: Edit
    href: "/admin/users/{id}/edit"
"#;

fn bootstrap_duckdb(path: &Path) -> anyhow::Result<()> {
    let conn = duckdb::Connection::open(path)?;
    conn.execute_batch(
        "
        CREATE TABLE roles (id INTEGER PRIMARY KEY, title VARCHAR);
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name VARCHAR,
            email VARCHAR,
            role_id INTEGER,
            active BOOLEAN
        );
        INSERT INTO roles VALUES (1, 'admin'), (2, 'editor');
        INSERT INTO users VALUES
            (1, 'Alice', 'alice@example.com', 1, true),
            (2, 'Bob', 'bob@example.com', 2, true),
            (3, 'Carla', 'carla@example.com', 2, false);
        ",
    )?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let workdir = tempfile::tempdir()?;
    let db_path = workdir.path().join("demo.duckdb");
    bootstrap_duckdb(&db_path)?;
    let tables_dir = workdir.path().join("tables");
    fs::create_dir_all(&tables_dir)?;
    fs::write(tables_dir.join("users.yml"), USERS_YAML)?;

    let mut connections = ConnectionManager::with_config(DatagridConfig::load_default());
    let duck = DuckDbConnection::with_config(&db_path, &DuckDbConfig { max_concurrency: 1 });
    connections.insert("default", Arc::new(duck));

    let registry = TableRegistry::load_from_dir(&tables_dir)?;
    Validator::new(connections.clone(), false)
        .validate_registry(&registry)
        .await?;
    let service = DataTableService::new(registry, connections);

    let ajax = AjaxOptions {
        url: "/admin/users/data".into(),
        transport: Transport::Post,
        csrf_token: Some("demo-token".into()),
        source: None,
    };
    if let Some(config) = service.client_config("users", &ajax) {
        println!("{}", config.to_script("users-table")?);
    }

    let get = RequestParams::from_pairs([
        ("draw", "1"),
        ("difta[name]", "users"),
        ("search[value]", "o"),
        ("columns[0][data]", "name"),
        ("order[0][column]", "0"),
        ("order[0][dir]", "desc"),
    ]);
    let response = service.handle(&get).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    let post = RequestParams::from_json(&serde_json::json!({
        "draw": 2,
        "difta": {"name": "users"},
        "start": 0,
        "length": 1
    }))?;
    let response = service.handle(&post).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
