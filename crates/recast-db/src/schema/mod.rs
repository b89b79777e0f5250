//! Schema introspection.
//!
//! A [`SchemaProvider`] answers structural questions about live tables
//! (columns, keys, unique constraints, sequences). [`CachedSchema`] wraps
//! any provider with TTL caching through a [`CacheRegistry`], since the
//! upsert path asks the same questions for every batch.

mod postgres;
mod sqlite;

pub use postgres::PostgresSchema;
pub use sqlite::SqliteSchema;

use std::collections::BTreeMap;

use recast_sql_core::{SqlDialect, SqlValue};
use serde::{Deserialize, Serialize};

use crate::cache::{memoized, CacheRegistry};
use crate::connection::Connection;
use crate::error::Result;

/// One table constraint as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintDef {
    /// Constraint (or index) name.
    pub name: String,
    /// Engine-rendered definition text, e.g. `UNIQUE (isin, mic)`.
    pub definition: String,
    /// Constrained columns in constraint order.
    pub columns: Vec<String>,
}

/// Answers structural questions about tables in one dialect.
#[allow(async_fn_in_trait)]
pub trait SchemaProvider {
    /// The dialect this provider introspects.
    fn dialect(&self) -> SqlDialect;

    /// Column names in table order.
    async fn columns<C: Connection>(&self, conn: &C, table: &str) -> Result<Vec<String>>;

    /// Primary key columns in key order.
    async fn primary_keys<C: Connection>(&self, conn: &C, table: &str) -> Result<Vec<String>>;

    /// Columns whose values come from a sequence or autoincrement.
    async fn sequence_columns<C: Connection>(&self, conn: &C, table: &str) -> Result<Vec<String>>;

    /// Unique constraint column sets, one inner vector per constraint.
    async fn unique_columns<C: Connection>(
        &self,
        conn: &C,
        table: &str,
    ) -> Result<Vec<Vec<String>>>;

    /// Looks up one named constraint, `None` when the table has no such
    /// constraint.
    async fn constraint_definition<C: Connection>(
        &self,
        conn: &C,
        table: &str,
        name: &str,
    ) -> Result<Option<ConstraintDef>>;

    /// Re-aligns the sequence feeding `column` with the current table
    /// contents. A no-op for engines without explicit sequences.
    async fn reset_sequence<C: Connection>(
        &self,
        conn: &C,
        table: &str,
        column: &str,
    ) -> Result<()>;
}

/// A [`SchemaProvider`] wrapper that memoizes results per table through a
/// [`CacheRegistry`]. Cache names are `<question>_<dialect>` so that
/// invalidation by table name spans every question at once.
pub struct CachedSchema<'a, P> {
    provider: P,
    registry: &'a CacheRegistry,
    bypass: bool,
}

impl<'a, P: SchemaProvider> CachedSchema<'a, P> {
    pub fn new(provider: P, registry: &'a CacheRegistry) -> Self {
        Self {
            provider,
            registry,
            bypass: false,
        }
    }

    /// Disables both cache lookup and store for subsequent calls.
    #[must_use]
    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn cache_name(&self, question: &str) -> String {
        format!("{question}_{}", self.provider.dialect())
    }
}

impl<P: SchemaProvider> SchemaProvider for CachedSchema<'_, P> {
    fn dialect(&self) -> SqlDialect {
        self.provider.dialect()
    }

    async fn columns<C: Connection>(&self, conn: &C, table: &str) -> Result<Vec<String>> {
        memoized(
            self.registry,
            &self.cache_name("table_columns"),
            table.to_lowercase(),
            self.bypass,
            || self.provider.columns(conn, table),
        )
        .await
    }

    async fn primary_keys<C: Connection>(&self, conn: &C, table: &str) -> Result<Vec<String>> {
        memoized(
            self.registry,
            &self.cache_name("primary_keys"),
            table.to_lowercase(),
            self.bypass,
            || self.provider.primary_keys(conn, table),
        )
        .await
    }

    async fn sequence_columns<C: Connection>(&self, conn: &C, table: &str) -> Result<Vec<String>> {
        memoized(
            self.registry,
            &self.cache_name("sequence_columns"),
            table.to_lowercase(),
            self.bypass,
            || self.provider.sequence_columns(conn, table),
        )
        .await
    }

    async fn unique_columns<C: Connection>(
        &self,
        conn: &C,
        table: &str,
    ) -> Result<Vec<Vec<String>>> {
        memoized(
            self.registry,
            &self.cache_name("unique_columns"),
            table.to_lowercase(),
            self.bypass,
            || self.provider.unique_columns(conn, table),
        )
        .await
    }

    async fn constraint_definition<C: Connection>(
        &self,
        conn: &C,
        table: &str,
        name: &str,
    ) -> Result<Option<ConstraintDef>> {
        memoized(
            self.registry,
            &self.cache_name("constraint_definition"),
            format!("{}:{name}", table.to_lowercase()),
            self.bypass,
            || self.provider.constraint_definition(conn, table, name),
        )
        .await
    }

    async fn reset_sequence<C: Connection>(
        &self,
        conn: &C,
        table: &str,
        column: &str,
    ) -> Result<()> {
        // Never cached: it mutates engine state.
        self.provider.reset_sequence(conn, table, column).await
    }
}

/// Picks the column whose sequence should be reset after explicit-key
/// writes: a primary key that is also sequence-backed wins, then any
/// sequence column, then any primary key, then the conventional `id`.
/// Within each tier, names mentioning "id" are preferred.
#[must_use]
pub fn find_sequence_column(primary_keys: &[String], sequence_columns: &[String]) -> String {
    fn prefer_id(cols: &[String]) -> Option<&String> {
        cols.iter()
            .find(|c| c.to_lowercase().contains("id"))
            .or_else(|| cols.first())
    }

    let in_both: Vec<String> = primary_keys
        .iter()
        .filter(|pk| sequence_columns.contains(pk))
        .cloned()
        .collect();
    prefer_id(&in_both)
        .or_else(|| prefer_id(sequence_columns))
        .or_else(|| prefer_id(primary_keys))
        .cloned()
        .unwrap_or_else(|| "id".to_string())
}

/// Case-insensitive lookup from any spelling of a column name to its
/// canonical (engine-reported) spelling.
pub(crate) struct CaseFold {
    canonical: BTreeMap<String, String>,
}

impl CaseFold {
    pub(crate) fn new(names: &[String]) -> Self {
        Self {
            canonical: names
                .iter()
                .map(|n| (n.to_lowercase(), n.clone()))
                .collect(),
        }
    }

    pub(crate) fn canonical(&self, name: &str) -> Option<&str> {
        self.canonical.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// Extracts the first column of each row as text. Introspection queries
/// all select a single name column.
pub(crate) fn name_column(rows: Vec<Vec<SqlValue>>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| match row.into_iter().next() {
            Some(SqlValue::Text(s)) => Some(s),
            _ => None,
        })
        .collect()
}
