//! Connection abstraction and the SQLite implementation.

use recast_sql_core::{convert_placeholders, prepare, Param, Params, SqlDialect, SqlValue};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};
use tracing::debug;

use crate::error::{DbError, Result};
use crate::retry::RetryPolicy;

/// One open database connection (or pool), dialect-aware.
///
/// Implementations receive statements written with `%s` / `%(name)s`
/// placeholders and rewrite them to whatever their driver binds.
#[allow(async_fn_in_trait)]
pub trait Connection {
    /// The SQL dialect this connection speaks.
    fn dialect(&self) -> SqlDialect;

    /// Whether an explicit transaction is open. Autocommit pools report
    /// `false`.
    fn in_transaction(&self) -> bool;

    /// Executes a statement and returns the affected row count.
    async fn execute(&self, sql: &str, params: Params) -> Result<u64>;

    /// Fetches all rows, decoded into dialect-neutral values in column
    /// order.
    async fn fetch_rows(&self, sql: &str, params: Params) -> Result<Vec<Vec<SqlValue>>>;

    /// Executes one already-rewritten statement once per row of bind
    /// values, returning the summed affected count.
    async fn execute_batch(&self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<u64>;
}

/// SQLite connection backed by an `sqlx` pool.
pub struct SqliteConnection {
    pool: SqlitePool,
}

impl SqliteConnection {
    /// Opens a pool for the given SQLite URL.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Driver`] when the database cannot be opened.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().connect(url).await?;
        debug!(url, "opened sqlite pool");
        Ok(Self { pool })
    }

    /// Opens a pool, retrying transient failures per `policy`.
    ///
    /// # Errors
    ///
    /// Returns the final [`DbError::Driver`] once retries are exhausted.
    pub async fn connect_with_retries(url: &str, policy: &RetryPolicy) -> Result<Self> {
        policy.run(|| Self::connect(url)).await
    }

    /// Wraps an existing pool. Useful in tests that need a shared
    /// in-memory database.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Rewrites a statement into `?`-marker form and flattens the
    /// parameters for binding.
    fn prepare_for_bind(sql: &str, params: Params) -> Result<(String, Vec<SqlValue>)> {
        if params.is_empty() {
            return Ok((convert_placeholders(sql, SqlDialect::Sqlite), Vec::new()));
        }
        let (sql, params) = prepare(sql, params, SqlDialect::Sqlite)?;
        let Params::Positional(args) = params else {
            return Err(DbError::NamedParamsUnsupported);
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Param::Value(v) => values.push(v),
                Param::List(_) => return Err(DbError::UnexpandedListParam),
            }
        }
        Ok((sql, values))
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn in_transaction(&self) -> bool {
        false
    }

    async fn execute(&self, sql: &str, params: Params) -> Result<u64> {
        let (sql, values) = Self::prepare_for_bind(sql, params)?;
        let result = bind_values(sqlx::query(&sql), values)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn fetch_rows(&self, sql: &str, params: Params) -> Result<Vec<Vec<SqlValue>>> {
        let (sql, values) = Self::prepare_for_bind(sql, params)?;
        let rows = bind_values(sqlx::query(&sql), values)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute_batch(&self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<u64> {
        let mut affected = 0;
        for row in rows {
            let result = bind_values(sqlx::query(sql), row.clone())
                .execute(&self.pool)
                .await?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_values(mut query: SqliteQuery<'_>, values: Vec<SqlValue>) -> SqliteQuery<'_> {
    for value in values {
        query = match value {
            SqlValue::Null => query.bind(Option::<i64>::None),
            SqlValue::Bool(b) => query.bind(b),
            SqlValue::Int(i) => query.bind(i),
            SqlValue::Float(f) => query.bind(f),
            SqlValue::Text(s) => query.bind(s),
            SqlValue::Blob(b) => query.bind(b),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> Result<Vec<SqlValue>> {
    let mut out = Vec::with_capacity(row.len());
    for i in 0..row.len() {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            out.push(SqlValue::Null);
            continue;
        }
        // SQLite storage classes; BOOLEAN columns come back as INTEGER.
        let value = match raw.type_info().name() {
            "INTEGER" => SqlValue::Int(row.try_get::<i64, _>(i)?),
            "REAL" => SqlValue::Float(row.try_get::<f64, _>(i)?),
            "BLOB" => SqlValue::Blob(row.try_get::<Vec<u8>, _>(i)?),
            _ => SqlValue::Text(row.try_get::<String, _>(i)?),
        };
        out.push(value);
    }
    Ok(out)
}
