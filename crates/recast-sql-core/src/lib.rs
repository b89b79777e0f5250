//! # recast-sql-core
//!
//! Dialect-neutral SQL statement preparation.
//!
//! Application code writes one parameterized statement and hands it to
//! [`prepare`] together with the target [`SqlDialect`]; the crate takes care
//! of everything the individual drivers disagree on:
//!
//! - placeholder discovery (`%s`, `%(name)s`, `?`) that never misfires inside
//!   string literals or `regexp_replace(...)` calls
//! - IN-clause expansion for sequence parameters (including empty sequences)
//! - `IS %s` / `IS NOT %s` rewriting when the bound value is NULL
//! - placeholder marker conversion between `%s` and `?`
//! - escaping of literal percent signs for `%`-formatting drivers
//!
//! ```rust
//! use recast_sql_core::{prepare, Param, Params, SqlDialect};
//!
//! let params = Params::positional(vec![Param::list([1, 2, 3])]);
//! let (sql, args) = prepare("SELECT * FROM t WHERE id IN %s", params, SqlDialect::Sqlite).unwrap();
//! assert_eq!(sql, "SELECT * FROM t WHERE id IN (?, ?, ?)");
//! assert_eq!(args.len(), 3);
//! ```
//!
//! Everything in this crate is pure and synchronous: no I/O, no shared
//! state, safe to call concurrently.

pub mod dialect;
pub mod error;
pub mod params;
pub mod rewrite;
pub mod scan;
pub mod value;

pub use dialect::SqlDialect;
pub use error::{PrepareError, Result};
pub use params::{Param, Params};
pub use rewrite::{convert_placeholders, prepare};
pub use scan::{scan_placeholders, PlaceholderContext, PlaceholderToken, Span};
pub use value::{SqlValue, ToSqlValue};
