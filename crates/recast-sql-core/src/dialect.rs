//! SQL dialect support.
//!
//! Dialect names arrive as strings at the boundary and are parsed exactly
//! once into [`SqlDialect`]; everything downstream switches on the enum.

use std::fmt;

use crate::error::{PrepareError, Result};

/// The target SQL engine, which decides placeholder markers, identifier
/// quoting and upsert syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDialect {
    /// PostgreSQL. Drivers use `%`-style formatting (`%s`, `%(name)s`).
    Postgres,
    /// SQLite. Drivers use `?` markers.
    Sqlite,
    /// Microsoft SQL Server. Drivers use `?` markers; no `ON CONFLICT`.
    SqlServer,
}

impl SqlDialect {
    /// Parses a dialect name as reported by a connection.
    ///
    /// # Errors
    ///
    /// Returns [`PrepareError::UnknownDialect`] for unrecognized names.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            "mssql" | "sqlserver" => Ok(Self::SqlServer),
            other => Err(PrepareError::UnknownDialect(other.to_string())),
        }
    }

    /// Returns the canonical dialect name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgresql",
            Self::Sqlite => "sqlite",
            Self::SqlServer => "mssql",
        }
    }

    /// Returns the positional placeholder marker emitted for this dialect.
    #[must_use]
    pub const fn marker(self) -> &'static str {
        match self {
            Self::Postgres => "%s",
            Self::Sqlite | Self::SqlServer => "?",
        }
    }

    /// Whether drivers for this dialect apply `%`-style formatting to the
    /// statement text, which makes literal percent signs hazardous.
    #[must_use]
    pub const fn is_postgres_family(self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// Quotes an identifier (table or column name) for this dialect.
    #[must_use]
    pub fn quote_identifier(self, identifier: &str) -> String {
        match self {
            Self::Postgres | Self::Sqlite => {
                format!("\"{}\"", identifier.replace('"', "\"\""))
            }
            Self::SqlServer => format!("[{}]", identifier.replace(']', "]]")),
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
