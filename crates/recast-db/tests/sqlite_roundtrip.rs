//! End-to-end tests against an in-memory SQLite database.

use std::collections::BTreeMap;

use recast_db::{
    insert_rows, upsert_rows, CacheRegistry, CachedSchema, Connection, DbError, Row,
    SchemaProvider, SqliteConnection, SqliteSchema, UpsertOptions,
};
use recast_sql_core::{Param, Params, SqlValue};
use sqlx::sqlite::SqlitePoolOptions;

async fn connect() -> SqliteConnection {
    // One connection so every statement sees the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    SqliteConnection::from_pool(pool)
}

async fn setup_instruments(conn: &SqliteConnection) {
    conn.execute(
        "CREATE TABLE instruments (\
         id integer primary key autoincrement, \
         name text not null unique, \
         value integer)",
        Params::none(),
    )
    .await
    .unwrap();
}

fn row(pairs: &[(&str, SqlValue)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect::<BTreeMap<_, _>>()
}

fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

async fn fetch_name_value(conn: &SqliteConnection, name: &str) -> Vec<Vec<SqlValue>> {
    conn.fetch_rows(
        "SELECT name, value FROM instruments WHERE name = %s",
        Params::positional(vec![Param::value(name)]),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_insert_and_fetch_roundtrip() {
    let conn = connect().await;
    setup_instruments(&conn).await;
    let registry = CacheRegistry::default();
    let schema = CachedSchema::new(SqliteSchema, &registry);

    let written = insert_rows(
        &conn,
        &schema,
        "instruments",
        &[
            row(&[("name", text("bond")), ("value", SqlValue::Int(10))]),
            row(&[("name", text("swap")), ("value", SqlValue::Int(20))]),
        ],
    )
    .await
    .unwrap();
    assert_eq!(written, 2);

    let rows = fetch_name_value(&conn, "bond").await;
    assert_eq!(rows, vec![vec![text("bond"), SqlValue::Int(10)]]);
}

#[tokio::test]
async fn test_insert_reconciles_case_and_unknown_columns() {
    let conn = connect().await;
    setup_instruments(&conn).await;
    let registry = CacheRegistry::default();
    let schema = CachedSchema::new(SqliteSchema, &registry);

    let written = insert_rows(
        &conn,
        &schema,
        "instruments",
        &[row(&[
            ("NAME", text("bond")),
            ("Value", SqlValue::Int(5)),
            ("nonexistent", SqlValue::Int(1)),
        ])],
    )
    .await
    .unwrap();
    assert_eq!(written, 1);
    let rows = fetch_name_value(&conn, "bond").await;
    assert_eq!(rows, vec![vec![text("bond"), SqlValue::Int(5)]]);
}

#[tokio::test]
async fn test_upsert_do_nothing_skips_conflicts() {
    let conn = connect().await;
    setup_instruments(&conn).await;
    let registry = CacheRegistry::default();
    let schema = CachedSchema::new(SqliteSchema, &registry);
    let options = UpsertOptions::default();

    let first = upsert_rows(
        &conn,
        &schema,
        "instruments",
        &[row(&[("name", text("bond")), ("value", SqlValue::Int(1))])],
        &options,
    )
    .await
    .unwrap();
    assert_eq!(first, 1);

    // Same unique name again: skipped, nothing overwritten.
    let second = upsert_rows(
        &conn,
        &schema,
        "instruments",
        &[row(&[("name", text("bond")), ("value", SqlValue::Int(99))])],
        &options,
    )
    .await
    .unwrap();
    assert_eq!(second, 0);
    let rows = fetch_name_value(&conn, "bond").await;
    assert_eq!(rows, vec![vec![text("bond"), SqlValue::Int(1)]]);
}

#[tokio::test]
async fn test_upsert_update_always_overwrites() {
    let conn = connect().await;
    setup_instruments(&conn).await;
    let registry = CacheRegistry::default();
    let schema = CachedSchema::new(SqliteSchema, &registry);
    let options = UpsertOptions {
        update_always: vec!["value".to_string()],
        ..UpsertOptions::default()
    };

    for value in [1_i64, 42] {
        upsert_rows(
            &conn,
            &schema,
            "instruments",
            &[row(&[("name", text("bond")), ("value", SqlValue::Int(value))])],
            &options,
        )
        .await
        .unwrap();
    }
    let rows = fetch_name_value(&conn, "bond").await;
    assert_eq!(rows, vec![vec![text("bond"), SqlValue::Int(42)]]);
}

#[tokio::test]
async fn test_upsert_update_if_null_preserves_values() {
    let conn = connect().await;
    setup_instruments(&conn).await;
    let registry = CacheRegistry::default();
    let schema = CachedSchema::new(SqliteSchema, &registry);
    let options = UpsertOptions {
        update_if_null: vec!["value".to_string()],
        ..UpsertOptions::default()
    };

    upsert_rows(
        &conn,
        &schema,
        "instruments",
        &[row(&[("name", text("bond")), ("value", SqlValue::Null)])],
        &options,
    )
    .await
    .unwrap();

    // Fills the NULL.
    upsert_rows(
        &conn,
        &schema,
        "instruments",
        &[row(&[("name", text("bond")), ("value", SqlValue::Int(7))])],
        &options,
    )
    .await
    .unwrap();
    let rows = fetch_name_value(&conn, "bond").await;
    assert_eq!(rows, vec![vec![text("bond"), SqlValue::Int(7)]]);

    // A later value must not overwrite the stored one.
    upsert_rows(
        &conn,
        &schema,
        "instruments",
        &[row(&[("name", text("bond")), ("value", SqlValue::Int(99))])],
        &options,
    )
    .await
    .unwrap();
    let rows = fetch_name_value(&conn, "bond").await;
    assert_eq!(rows, vec![vec![text("bond"), SqlValue::Int(7)]]);
}

#[tokio::test]
async fn test_upsert_on_primary_key_when_keys_present() {
    let conn = connect().await;
    setup_instruments(&conn).await;
    let registry = CacheRegistry::default();
    let schema = CachedSchema::new(SqliteSchema, &registry);
    let options = UpsertOptions {
        update_always: vec!["value".to_string()],
        ..UpsertOptions::default()
    };

    let rows_with_id = |value: i64| {
        vec![row(&[
            ("id", SqlValue::Int(1)),
            ("name", text("bond")),
            ("value", SqlValue::Int(value)),
        ])]
    };
    upsert_rows(&conn, &schema, "instruments", &rows_with_id(1), &options)
        .await
        .unwrap();
    upsert_rows(&conn, &schema, "instruments", &rows_with_id(8), &options)
        .await
        .unwrap();

    let rows = conn
        .fetch_rows(
            "SELECT id, value FROM instruments WHERE id = %s",
            Params::positional(vec![Param::value(1_i64)]),
        )
        .await
        .unwrap();
    assert_eq!(rows, vec![vec![SqlValue::Int(1), SqlValue::Int(8)]]);
}

#[tokio::test]
async fn test_upsert_falls_back_to_insert_without_target() {
    let conn = connect().await;
    conn.execute(
        "CREATE TABLE notes (id integer primary key autoincrement, body text)",
        Params::none(),
    )
    .await
    .unwrap();
    let registry = CacheRegistry::default();
    let schema = CachedSchema::new(SqliteSchema, &registry);

    // No key in the data and no unique constraint: plain insert.
    let written = upsert_rows(
        &conn,
        &schema,
        "notes",
        &[row(&[("body", text("a"))]), row(&[("body", text("b"))])],
        &UpsertOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(written, 2);
}

#[tokio::test]
async fn test_in_clause_fetch() {
    let conn = connect().await;
    setup_instruments(&conn).await;
    let registry = CacheRegistry::default();
    let schema = CachedSchema::new(SqliteSchema, &registry);

    insert_rows(
        &conn,
        &schema,
        "instruments",
        &[
            row(&[("name", text("a")), ("value", SqlValue::Int(1))]),
            row(&[("name", text("b")), ("value", SqlValue::Int(2))]),
            row(&[("name", text("c")), ("value", SqlValue::Int(3))]),
        ],
    )
    .await
    .unwrap();

    let rows = conn
        .fetch_rows(
            "SELECT name FROM instruments WHERE name IN %s ORDER BY name",
            Params::positional(vec![Param::list(["a", "c"])]),
        )
        .await
        .unwrap();
    assert_eq!(rows, vec![vec![text("a")], vec![text("c")]]);
}

#[tokio::test]
async fn test_schema_introspection_and_caching() {
    let conn = connect().await;
    setup_instruments(&conn).await;
    let registry = CacheRegistry::default();
    let schema = CachedSchema::new(SqliteSchema, &registry);

    let columns = schema.columns(&conn, "instruments").await.unwrap();
    assert_eq!(columns, vec!["id", "name", "value"]);
    assert_eq!(
        schema.primary_keys(&conn, "instruments").await.unwrap(),
        vec!["id"]
    );
    assert_eq!(
        schema.unique_columns(&conn, "instruments").await.unwrap(),
        vec![vec!["name".to_string()]]
    );

    // The answer must come from cache even after the table changes.
    conn.execute("ALTER TABLE instruments ADD COLUMN extra text", Params::none())
        .await
        .unwrap();
    let cached = schema.columns(&conn, "instruments").await.unwrap();
    assert_eq!(cached, columns);

    // Invalidation brings back live answers.
    registry.clear_for_table("instruments");
    let live = schema.columns(&conn, "instruments").await.unwrap();
    assert_eq!(live, vec!["id", "name", "value", "extra"]);
}

#[tokio::test]
async fn test_named_params_are_rejected() {
    let conn = connect().await;
    setup_instruments(&conn).await;

    let err = conn
        .execute(
            "SELECT * FROM instruments WHERE name = %(name)s",
            Params::named([("name", Param::value("bond"))]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NamedParamsUnsupported));
}

#[tokio::test]
async fn test_is_null_rewriting_through_connection() {
    let conn = connect().await;
    setup_instruments(&conn).await;
    let registry = CacheRegistry::default();
    let schema = CachedSchema::new(SqliteSchema, &registry);

    insert_rows(
        &conn,
        &schema,
        "instruments",
        &[
            row(&[("name", text("bond")), ("value", SqlValue::Null)]),
            row(&[("name", text("swap")), ("value", SqlValue::Int(2))]),
        ],
    )
    .await
    .unwrap();

    let rows = conn
        .fetch_rows(
            "SELECT name FROM instruments WHERE value IS %s",
            Params::positional(vec![Param::null()]),
        )
        .await
        .unwrap();
    assert_eq!(rows, vec![vec![text("bond")]]);
}
