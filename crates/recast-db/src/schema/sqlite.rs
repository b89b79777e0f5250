//! SQLite schema introspection via pragma table-valued functions.
//!
//! Pragma functions do not accept bound parameters, so the table name is
//! interpolated as an escaped string literal.

use recast_sql_core::{Params, SqlDialect};
use tracing::debug;

use super::{name_column, ConstraintDef, SchemaProvider};
use crate::connection::Connection;
use crate::error::Result;

/// Introspects SQLite databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteSchema;

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl SqliteSchema {
    async fn unique_index_names<C: Connection>(
        &self,
        conn: &C,
        table: &str,
    ) -> Result<Vec<String>> {
        let sql = format!(
            "select name from pragma_index_list({}) where \"unique\" = 1 and origin <> 'pk' order by seq",
            quote_literal(table)
        );
        Ok(name_column(conn.fetch_rows(&sql, Params::none()).await?))
    }

    async fn index_columns<C: Connection>(&self, conn: &C, index: &str) -> Result<Vec<String>> {
        let sql = format!(
            "select name from pragma_index_info({}) order by seqno",
            quote_literal(index)
        );
        Ok(name_column(conn.fetch_rows(&sql, Params::none()).await?))
    }
}

impl SchemaProvider for SqliteSchema {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn columns<C: Connection>(&self, conn: &C, table: &str) -> Result<Vec<String>> {
        let sql = format!(
            "select name from pragma_table_info({}) order by cid",
            quote_literal(table)
        );
        Ok(name_column(conn.fetch_rows(&sql, Params::none()).await?))
    }

    async fn primary_keys<C: Connection>(&self, conn: &C, table: &str) -> Result<Vec<String>> {
        let sql = format!(
            "select name from pragma_table_info({}) where pk <> 0 order by pk",
            quote_literal(table)
        );
        Ok(name_column(conn.fetch_rows(&sql, Params::none()).await?))
    }

    async fn sequence_columns<C: Connection>(&self, conn: &C, table: &str) -> Result<Vec<String>> {
        // An INTEGER PRIMARY KEY is a rowid alias, which autoincrements.
        self.primary_keys(conn, table).await
    }

    async fn unique_columns<C: Connection>(
        &self,
        conn: &C,
        table: &str,
    ) -> Result<Vec<Vec<String>>> {
        let mut sets = Vec::new();
        for index in self.unique_index_names(conn, table).await? {
            let columns = self.index_columns(conn, &index).await?;
            if !columns.is_empty() {
                sets.push(columns);
            }
        }
        Ok(sets)
    }

    async fn constraint_definition<C: Connection>(
        &self,
        conn: &C,
        table: &str,
        name: &str,
    ) -> Result<Option<ConstraintDef>> {
        for index in self.unique_index_names(conn, table).await? {
            if index.eq_ignore_ascii_case(name) {
                let columns = self.index_columns(conn, &index).await?;
                let definition = format!("UNIQUE ({})", columns.join(", "));
                return Ok(Some(ConstraintDef {
                    name: index,
                    definition,
                    columns,
                }));
            }
        }
        Ok(None)
    }

    async fn reset_sequence<C: Connection>(
        &self,
        _conn: &C,
        table: &str,
        column: &str,
    ) -> Result<()> {
        // rowid aliases pick up from max(rowid) on their own.
        debug!(table, column, "sqlite sequences need no reset");
        Ok(())
    }
}
