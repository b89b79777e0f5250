//! Async database helpers built on [`recast_sql_core`]'s statement
//! rewriting: connections that accept `%s` / `%(name)s` placeholders,
//! cached schema introspection, batched inserts with column
//! reconciliation, and upsert statements synthesized from table
//! structure.
//!
//! ```no_run
//! use recast_db::{insert_rows, CacheRegistry, CachedSchema, SqliteConnection, SqliteSchema};
//!
//! # async fn demo() -> recast_db::Result<()> {
//! let conn = SqliteConnection::connect("sqlite::memory:").await?;
//! let registry = CacheRegistry::default();
//! let schema = CachedSchema::new(SqliteSchema, &registry);
//! let written = insert_rows(&conn, &schema, "instruments", &[]).await?;
//! assert_eq!(written, 0);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod connection;
pub mod error;
pub mod insert;
pub mod retry;
pub mod schema;
pub mod types;
pub mod upsert;

pub use cache::{memoized, CacheConfig, CacheRegistry, TtlCache};
pub use connection::{Connection, SqliteConnection};
pub use error::{DbError, Result};
pub use insert::{insert_rows, Row};
pub use retry::RetryPolicy;
pub use schema::{
    find_sequence_column, CachedSchema, ConstraintDef, PostgresSchema, SchemaProvider,
    SqliteSchema,
};
pub use types::{sqlserver_type_class, TypeClass};
pub use upsert::{upsert_rows, UpsertOptions};
