//! Upsert synthesis.
//!
//! Builds `INSERT ... ON CONFLICT` statements from introspected table
//! structure: the conflict target comes from the primary key, a named
//! constraint, or (on SQLite) the first unique constraint fully covered
//! by the incoming data. Columns update unconditionally, only when the
//! stored value is NULL, or not at all.

use recast_sql_core::{SqlDialect, SqlValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{DbError, Result};
use crate::insert::{build_insert_sql, insert_reconciled, reconcile_batch, row_params, Row};
use crate::schema::{find_sequence_column, SchemaProvider};

/// Upsert behavior knobs, deserializable from application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpsertOptions {
    /// Conflict on this named constraint instead of the primary key.
    /// PostgreSQL only; other dialects ignore it.
    pub constraint_name: Option<String>,
    /// Columns overwritten on every conflict.
    pub update_always: Vec<String>,
    /// Columns written only when the stored value is NULL.
    pub update_if_null: Vec<String>,
    /// Detect conflicts only on the primary key: when the rows do not
    /// carry the key columns, fall back to a plain insert instead of
    /// substituting a unique constraint.
    pub use_primary_key: bool,
    /// Re-align the key sequence after writing explicit key values.
    pub reset_sequence: bool,
    /// Rows per driver round-trip.
    pub batch_size: usize,
}

impl Default for UpsertOptions {
    fn default() -> Self {
        Self {
            constraint_name: None,
            update_always: Vec::new(),
            update_if_null: Vec::new(),
            use_primary_key: false,
            reset_sequence: false,
            batch_size: 500,
        }
    }
}

enum ConflictTarget {
    Columns(Vec<String>),
    Constraint(String),
}

/// Inserts rows with conflict handling synthesized from the table's
/// structure. Returns the number of rows written or updated; conflicting
/// rows with no update columns configured are skipped silently.
///
/// Falls back to a plain insert when no usable conflict target exists.
///
/// # Errors
///
/// Returns [`DbError::UnsupportedUpsert`] for dialects without a native
/// upsert, and [`DbError`] variants for introspection or driver failures.
pub async fn upsert_rows<C, P>(
    conn: &C,
    schema: &P,
    table: &str,
    rows: &[Row],
    options: &UpsertOptions,
) -> Result<u64>
where
    C: Connection,
    P: SchemaProvider,
{
    if rows.is_empty() {
        debug!(table, "upsert called with no rows");
        return Ok(0);
    }
    let dialect = conn.dialect();
    if dialect == SqlDialect::SqlServer {
        return Err(DbError::UnsupportedUpsert(dialect));
    }

    let live = schema.columns(conn, table).await?;
    let Some(batch) = reconcile_batch(&live, rows) else {
        warn!(table, "no rows left after column reconciliation");
        return Ok(0);
    };

    let primary_keys = schema.primary_keys(conn, table).await?;
    let keys_in_data =
        !primary_keys.is_empty() && primary_keys.iter().all(|k| batch.columns.contains(k));

    let target = resolve_conflict_target(
        conn,
        schema,
        table,
        options,
        dialect,
        &primary_keys,
        keys_in_data,
        &batch.columns,
    )
    .await?;

    let Some(target) = target else {
        debug!(table, "no conflict target available, inserting plainly");
        return insert_reconciled(conn, table, &batch).await;
    };

    // Raw key columns cannot be both the match target and an update
    // target. A named constraint carries no such restriction: its columns
    // may still be updated.
    let key_columns: Vec<String> = match &target {
        ConflictTarget::Columns(cols) => cols.clone(),
        ConflictTarget::Constraint(_) => Vec::new(),
    };

    let update_always = filter_update_columns(
        &options.update_always,
        &batch.columns,
        &key_columns,
        &[],
        table,
    );
    let update_if_null = filter_update_columns(
        &options.update_if_null,
        &batch.columns,
        &key_columns,
        &update_always,
        table,
    );

    let sql = build_upsert_sql(
        dialect,
        table,
        &batch.columns,
        &target,
        &update_always,
        &update_if_null,
    );

    let bind_rows: Vec<Vec<SqlValue>> = batch
        .rows
        .iter()
        .map(|row| row_params(&batch.columns, row))
        .collect();

    let mut affected = 0;
    for chunk in bind_rows.chunks(options.batch_size.max(1)) {
        affected += conn.execute_batch(&sql, chunk).await?;
    }
    let total = bind_rows.len() as u64;
    if affected < total {
        debug!(table, skipped = total - affected, "conflicting rows skipped");
    }

    if options.reset_sequence && keys_in_data {
        let sequence_columns = schema.sequence_columns(conn, table).await?;
        let column = find_sequence_column(&primary_keys, &sequence_columns);
        schema.reset_sequence(conn, table, &column).await?;
    }
    Ok(affected)
}

#[allow(clippy::too_many_arguments)]
async fn resolve_conflict_target<C, P>(
    conn: &C,
    schema: &P,
    table: &str,
    options: &UpsertOptions,
    dialect: SqlDialect,
    primary_keys: &[String],
    keys_in_data: bool,
    data_columns: &[String],
) -> Result<Option<ConflictTarget>>
where
    C: Connection,
    P: SchemaProvider,
{
    if let Some(name) = &options.constraint_name {
        if dialect == SqlDialect::Postgres {
            if schema
                .constraint_definition(conn, table, name)
                .await?
                .is_some()
            {
                return Ok(Some(ConflictTarget::Constraint(name.clone())));
            }
            warn!(table, constraint = %name, "named constraint not found, ignoring");
        } else {
            debug!(table, constraint = %name, "constraint targets are postgres-only, ignoring");
        }
    }

    if !primary_keys.is_empty() && keys_in_data {
        return Ok(Some(ConflictTarget::Columns(primary_keys.to_vec())));
    }

    // Without key values a SQLite write can still conflict on a unique
    // constraint whose columns the data carries in full, unless the caller
    // pinned conflict detection to the primary key.
    if dialect == SqlDialect::Sqlite && !options.use_primary_key {
        for unique_set in schema.unique_columns(conn, table).await? {
            if unique_set.iter().all(|c| data_columns.contains(c)) {
                return Ok(Some(ConflictTarget::Columns(unique_set)));
            }
        }
    }
    Ok(None)
}

fn filter_update_columns(
    requested: &[String],
    data_columns: &[String],
    key_columns: &[String],
    already_taken: &[String],
    table: &str,
) -> Vec<String> {
    let mut kept = Vec::new();
    for column in requested {
        let Some(canonical) = data_columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(column))
        else {
            debug!(table, column = %column, "update column not in batch, dropping");
            continue;
        };
        if key_columns.iter().any(|k| k.eq_ignore_ascii_case(column)) {
            debug!(table, column = %column, "conflict key cannot be updated, dropping");
            continue;
        }
        if already_taken.iter().any(|k| k.eq_ignore_ascii_case(column)) {
            continue;
        }
        kept.push(canonical.clone());
    }
    kept
}

fn build_upsert_sql(
    dialect: SqlDialect,
    table: &str,
    columns: &[String],
    target: &ConflictTarget,
    update_always: &[String],
    update_if_null: &[String],
) -> String {
    let mut sql = build_insert_sql(dialect, table, columns);
    match target {
        ConflictTarget::Columns(cols) => {
            let quoted: Vec<String> = cols.iter().map(|c| dialect.quote_identifier(c)).collect();
            sql.push_str(&format!(" ON CONFLICT ({})", quoted.join(", ")));
        }
        ConflictTarget::Constraint(name) => {
            sql.push_str(&format!(
                " ON CONFLICT ON CONSTRAINT {}",
                dialect.quote_identifier(name)
            ));
        }
    }

    let qtable = dialect.quote_identifier(table);
    let mut assignments: Vec<String> = update_always
        .iter()
        .map(|c| {
            let qc = dialect.quote_identifier(c);
            format!("{qc} = excluded.{qc}")
        })
        .collect();
    assignments.extend(update_if_null.iter().map(|c| {
        let qc = dialect.quote_identifier(c);
        format!("{qc} = coalesce({qtable}.{qc}, excluded.{qc})")
    }));

    if assignments.is_empty() {
        sql.push_str(" DO NOTHING");
    } else {
        sql.push_str(" DO UPDATE SET ");
        sql.push_str(&assignments.join(", "));
    }
    if dialect == SqlDialect::Postgres {
        sql.push_str(" RETURNING *");
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ConstraintDef;
    use recast_sql_core::Params;
    use std::sync::Mutex;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn sample_row(names: &[&str]) -> Row {
        names
            .iter()
            .map(|n| ((*n).to_string(), SqlValue::Int(1)))
            .collect()
    }

    struct RecordingConn {
        dialect: SqlDialect,
        statements: Mutex<Vec<String>>,
    }

    impl RecordingConn {
        fn new(dialect: SqlDialect) -> Self {
            Self {
                dialect,
                statements: Mutex::new(Vec::new()),
            }
        }

        fn last_statement(&self) -> String {
            self.statements.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Connection for RecordingConn {
        fn dialect(&self) -> SqlDialect {
            self.dialect
        }

        fn in_transaction(&self) -> bool {
            false
        }

        async fn execute(&self, sql: &str, _params: Params) -> Result<u64> {
            self.statements.lock().unwrap().push(sql.to_string());
            Ok(1)
        }

        async fn fetch_rows(&self, _sql: &str, _params: Params) -> Result<Vec<Vec<SqlValue>>> {
            Ok(Vec::new())
        }

        async fn execute_batch(&self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<u64> {
            self.statements.lock().unwrap().push(sql.to_string());
            Ok(rows.len() as u64)
        }
    }

    struct StaticSchema {
        dialect: SqlDialect,
        columns: Vec<String>,
        primary_keys: Vec<String>,
        uniques: Vec<Vec<String>>,
        constraint: Option<ConstraintDef>,
    }

    impl SchemaProvider for StaticSchema {
        fn dialect(&self) -> SqlDialect {
            self.dialect
        }

        async fn columns<C: Connection>(&self, _conn: &C, _table: &str) -> Result<Vec<String>> {
            Ok(self.columns.clone())
        }

        async fn primary_keys<C: Connection>(
            &self,
            _conn: &C,
            _table: &str,
        ) -> Result<Vec<String>> {
            Ok(self.primary_keys.clone())
        }

        async fn sequence_columns<C: Connection>(
            &self,
            _conn: &C,
            _table: &str,
        ) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn unique_columns<C: Connection>(
            &self,
            _conn: &C,
            _table: &str,
        ) -> Result<Vec<Vec<String>>> {
            Ok(self.uniques.clone())
        }

        async fn constraint_definition<C: Connection>(
            &self,
            _conn: &C,
            _table: &str,
            name: &str,
        ) -> Result<Option<ConstraintDef>> {
            Ok(self.constraint.clone().filter(|c| c.name == name))
        }

        async fn reset_sequence<C: Connection>(
            &self,
            _conn: &C,
            _table: &str,
            _column: &str,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_do_nothing_sql() {
        let sql = build_upsert_sql(
            SqlDialect::Sqlite,
            "t",
            &cols(&["id", "name"]),
            &ConflictTarget::Columns(cols(&["id"])),
            &[],
            &[],
        );
        assert_eq!(
            sql,
            "INSERT INTO \"t\" (\"id\", \"name\") VALUES (?, ?) \
             ON CONFLICT (\"id\") DO NOTHING"
        );
    }

    #[test]
    fn test_update_always_and_if_null_sql() {
        let sql = build_upsert_sql(
            SqlDialect::Sqlite,
            "t",
            &cols(&["id", "name", "value"]),
            &ConflictTarget::Columns(cols(&["id"])),
            &cols(&["name"]),
            &cols(&["value"]),
        );
        assert_eq!(
            sql,
            "INSERT INTO \"t\" (\"id\", \"name\", \"value\") VALUES (?, ?, ?) \
             ON CONFLICT (\"id\") DO UPDATE SET \"name\" = excluded.\"name\", \
             \"value\" = coalesce(\"t\".\"value\", excluded.\"value\")"
        );
    }

    #[test]
    fn test_constraint_target_sql_is_postgres_shaped() {
        let sql = build_upsert_sql(
            SqlDialect::Postgres,
            "t",
            &cols(&["isin", "mic", "name"]),
            &ConflictTarget::Constraint("uq_isin_mic".to_string()),
            &cols(&["name"]),
            &[],
        );
        assert_eq!(
            sql,
            "INSERT INTO \"t\" (\"isin\", \"mic\", \"name\") VALUES (%s, %s, %s) \
             ON CONFLICT ON CONSTRAINT \"uq_isin_mic\" DO UPDATE SET \
             \"name\" = excluded.\"name\" RETURNING *"
        );
    }

    #[tokio::test]
    async fn test_constraint_columns_stay_updatable_under_named_constraint() {
        let conn = RecordingConn::new(SqlDialect::Postgres);
        let schema = StaticSchema {
            dialect: SqlDialect::Postgres,
            columns: cols(&["isin", "mic", "name"]),
            primary_keys: Vec::new(),
            uniques: Vec::new(),
            constraint: Some(ConstraintDef {
                name: "uq_isin_mic".to_string(),
                definition: "UNIQUE (isin, mic)".to_string(),
                columns: cols(&["isin", "mic"]),
            }),
        };
        let options = UpsertOptions {
            constraint_name: Some("uq_isin_mic".to_string()),
            update_always: cols(&["mic", "name"]),
            ..UpsertOptions::default()
        };
        upsert_rows(&conn, &schema, "t", &[sample_row(&["isin", "mic", "name"])], &options)
            .await
            .unwrap();
        let sql = conn.last_statement();
        assert!(sql.contains("ON CONFLICT ON CONSTRAINT \"uq_isin_mic\""));
        assert!(sql.contains("\"mic\" = excluded.\"mic\""));
        assert!(sql.contains("\"name\" = excluded.\"name\""));
    }

    #[tokio::test]
    async fn test_raw_key_columns_never_updatable() {
        let conn = RecordingConn::new(SqlDialect::Postgres);
        let schema = StaticSchema {
            dialect: SqlDialect::Postgres,
            columns: cols(&["id", "name"]),
            primary_keys: cols(&["id"]),
            uniques: Vec::new(),
            constraint: None,
        };
        let options = UpsertOptions {
            update_always: cols(&["id", "name"]),
            ..UpsertOptions::default()
        };
        upsert_rows(&conn, &schema, "t", &[sample_row(&["id", "name"])], &options)
            .await
            .unwrap();
        let sql = conn.last_statement();
        assert!(sql.contains("ON CONFLICT (\"id\")"));
        assert!(sql.contains("\"name\" = excluded.\"name\""));
        assert!(!sql.contains("\"id\" = excluded.\"id\""));
    }

    #[tokio::test]
    async fn test_use_primary_key_without_key_data_inserts_plainly() {
        let conn = RecordingConn::new(SqlDialect::Postgres);
        let schema = StaticSchema {
            dialect: SqlDialect::Postgres,
            columns: cols(&["id", "name"]),
            primary_keys: cols(&["id"]),
            uniques: Vec::new(),
            constraint: None,
        };
        let options = UpsertOptions {
            use_primary_key: true,
            ..UpsertOptions::default()
        };
        upsert_rows(&conn, &schema, "t", &[sample_row(&["name"])], &options)
            .await
            .unwrap();
        assert_eq!(
            conn.last_statement(),
            "INSERT INTO \"t\" (\"name\") VALUES (%s)"
        );
    }

    #[tokio::test]
    async fn test_use_primary_key_suppresses_unique_substitution() {
        let conn = RecordingConn::new(SqlDialect::Sqlite);
        let schema = StaticSchema {
            dialect: SqlDialect::Sqlite,
            columns: cols(&["id", "name"]),
            primary_keys: cols(&["id"]),
            uniques: vec![cols(&["name"])],
            constraint: None,
        };
        let options = UpsertOptions {
            use_primary_key: true,
            ..UpsertOptions::default()
        };
        upsert_rows(&conn, &schema, "t", &[sample_row(&["name"])], &options)
            .await
            .unwrap();
        let sql = conn.last_statement();
        assert!(!sql.contains("ON CONFLICT"));
    }

    #[test]
    fn test_filter_update_columns() {
        let data = cols(&["Id", "Name", "Value"]);
        let keys = cols(&["Id"]);
        let always = filter_update_columns(&cols(&["name", "id", "missing"]), &data, &keys, &[], "t");
        assert_eq!(always, vec!["Name"]);
        let if_null = filter_update_columns(&cols(&["name", "value"]), &data, &keys, &always, "t");
        assert_eq!(if_null, vec!["Value"]);
    }
}
