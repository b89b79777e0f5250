//! Error types for database operations.

use recast_sql_core::{PrepareError, SqlDialect};
use thiserror::Error;

/// Errors raised by connections, schema introspection and upsert synthesis.
#[derive(Debug, Error)]
pub enum DbError {
    /// Statement rewriting rejected the SQL or its parameters.
    #[error("statement preparation failed: {0}")]
    Prepare(#[from] PrepareError),

    /// The underlying driver reported a failure.
    #[error("driver error: {0}")]
    Driver(#[from] sqlx::Error),

    /// Named parameters reached a connection whose driver only binds
    /// positionally.
    #[error("this connection does not support named parameters")]
    NamedParamsUnsupported,

    /// A list parameter survived rewriting, which means the statement had
    /// no IN placeholder to expand it into.
    #[error("list parameter was not expanded into an IN clause")]
    UnexpandedListParam,

    /// The dialect has no native upsert statement.
    #[error("upsert is not supported for dialect {0}")]
    UnsupportedUpsert(SqlDialect),
}

impl DbError {
    /// Whether retrying the operation could plausibly succeed. Only driver
    /// failures qualify; everything else is deterministic.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Driver(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
