use std::collections::HashMap;

use datagrid::config::DatagridConfig;
use datagrid::descriptor::ColumnDescriptor;
use datagrid::dialect::DuckDbDialect;
use datagrid::engine::render_statements;
use datagrid::query_builder::{build_query, resolve_table, ResolvedQuery, SchemaFacts};
use datagrid::request::RequestParams;
use datagrid::sql_ast::SortDirection;
use datagrid::ConnectionManager;

fn plan(descriptor: &ColumnDescriptor, facts: &SchemaFacts, pairs: &[(&str, &str)]) -> ResolvedQuery {
    let manager = ConnectionManager::new();
    let table = resolve_table(descriptor, &manager).unwrap();
    let request = RequestParams::from_pairs(pairs.iter().copied());
    build_query(
        descriptor,
        &request,
        &table,
        "default",
        facts,
        &DatagridConfig::default(),
    )
}

fn users_facts() -> SchemaFacts {
    SchemaFacts {
        base_columns: vec!["id".into(), "name".into(), "email".into()],
        joined_columns: HashMap::new(),
    }
}

#[test]
fn unknown_columns_never_reach_sql() {
    let descriptor = ColumnDescriptor::table("users").with_columns(["id", "name", "email"]);
    let hostile = [
        ("columns[0][data]", "password"),
        ("columns[0][search][value]", "x"),
        ("columns[1][data]", "name\" OR 1=1 --"),
        ("columns[1][search][value]", "x"),
        ("columns[2][data]", "secrets.token"),
        ("order[0][column]", "0"),
        ("order[1][column]", "1"),
        ("order[2][column]", "2"),
        ("password", "hunter2"),
    ];
    let query = plan(&descriptor, &users_facts(), &hostile);

    for column in query.referenced_columns() {
        assert!(
            ["id", "name", "email"].contains(&column.name.as_str()),
            "unexpected column {column:?}"
        );
        assert_eq!(column.table.as_deref(), Some("users"));
    }
    let sql = render_statements(&query, &DuckDbDialect);
    for statement in [&sql.count_total, &sql.count_filtered, &sql.select] {
        assert!(!statement.contains("password"));
        assert!(!statement.contains("secrets"));
        assert!(!statement.contains("1=1"));
    }
}

#[test]
fn global_search_scenario() {
    let descriptor = ColumnDescriptor::table("users").with_columns(["id", "name", "email"]);
    let query = plan(&descriptor, &users_facts(), &[("search[value]", "ali")]);
    let sql = render_statements(&query, &DuckDbDialect);

    assert!(sql.count_filtered.contains(
        r#"CAST("users"."name" AS VARCHAR) LIKE '%ali%' ESCAPE '\'"#
    ));
    assert!(sql.count_filtered.contains(
        r#"CAST("users"."email" AS VARCHAR) LIKE '%ali%' ESCAPE '\'"#
    ));
    assert!(sql.count_filtered.contains(" OR "));
    assert!(!sql.count_total.contains("LIKE"));
}

#[test]
fn row_index_order_is_rejected_and_falls_back() {
    let descriptor =
        ColumnDescriptor::table("users").with_columns(["DT_RowIndex", "id", "name", "email"]);
    let query = plan(
        &descriptor,
        &users_facts(),
        &[
            ("columns[0][data]", "DT_RowIndex"),
            ("columns[1][data]", "name"),
            ("order[0][column]", "0"),
            ("order[0][dir]", "desc"),
        ],
    );
    assert_eq!(query.order_by.len(), 1);
    assert_eq!(query.order_by[0].direction, SortDirection::Asc);
    let sql = render_statements(&query, &DuckDbDialect);
    assert!(sql.select.contains(r#"ORDER BY "users"."name" ASC"#));
    assert!(!sql.select.contains("DT_RowIndex"));
}

#[test]
fn order_is_never_empty_when_a_column_exists() {
    let descriptor = ColumnDescriptor::table("users");
    for pairs in [
        vec![],
        vec![("order[0][column]", "7")],
        vec![("columns[0][data]", "action"), ("order[0][column]", "0")],
    ] {
        let query = plan(&descriptor, &users_facts(), &pairs);
        assert!(!query.order_by.is_empty(), "{pairs:?}");
    }
}

#[test]
fn joined_id_is_aliased() {
    let descriptor = ColumnDescriptor::table("users")
        .with_columns(["id", "name", "roles.title"])
        .with_join("users.role_id", "roles.id");
    let facts = SchemaFacts {
        base_columns: vec!["id".into(), "name".into(), "role_id".into()],
        joined_columns: HashMap::from([(
            "roles".to_string(),
            vec!["id".to_string(), "title".to_string()],
        )]),
    };
    let query = plan(&descriptor, &facts, &[]);
    let sql = render_statements(&query, &DuckDbDialect).select;

    assert!(sql.starts_with(
        r#"SELECT "users".*, "roles"."id" AS "roles_id", "roles"."title" FROM "users" LEFT JOIN "roles" ON ("users"."role_id" = "roles"."id")"#
    ), "{sql}");
    // default order stays on the base id
    assert!(sql.contains(r#"ORDER BY "users"."id" ASC"#), "{sql}");
}

#[test]
fn like_metacharacters_are_escaped() {
    let descriptor = ColumnDescriptor::table("users").with_columns(["name"]);
    let query = plan(&descriptor, &users_facts(), &[("search[value]", "100%_o'k")]);
    let sql = render_statements(&query, &DuckDbDialect).count_filtered;
    assert!(sql.contains(r#"LIKE '%100\%\_o''k%' ESCAPE '\'"#), "{sql}");
}

#[test]
fn per_column_terms_are_anded() {
    let descriptor = ColumnDescriptor::table("users").with_columns(["id", "name", "email"]);
    let query = plan(
        &descriptor,
        &users_facts(),
        &[
            ("columns[0][data]", "name"),
            ("columns[0][search][value]", "al"),
            ("columns[1][data]", "email"),
            ("columns[1][search][value]", "example"),
        ],
    );
    assert_eq!(query.search.len(), 2);
    let sql = render_statements(&query, &DuckDbDialect).count_filtered;
    assert!(
        sql.ends_with(concat!(
            r#"WHERE CAST("users"."name" AS VARCHAR) LIKE '%al%' ESCAPE '\' "#,
            r#"AND CAST("users"."email" AS VARCHAR) LIKE '%example%' ESCAPE '\'"#
        )),
        "{sql}"
    );
    assert!(!sql.contains(" OR "));
}

#[test]
fn scalar_filter_after_set_wins_under_last_wins() {
    let descriptor = ColumnDescriptor::table("users").with_columns(["id", "name", "email"]);
    let query = plan(
        &descriptor,
        &users_facts(),
        &[("name[]", "alice"), ("name[]", "carla"), ("name", "bob")],
    );
    let sql = render_statements(&query, &DuckDbDialect).count_filtered;
    assert!(sql.contains(r#""users"."name" = 'bob'"#), "{sql}");
    assert!(!sql.contains(" IN "), "{sql}");
}
