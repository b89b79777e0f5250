//! PostgreSQL schema introspection via the system catalogs.

use recast_sql_core::{Param, Params, SqlDialect, SqlValue};

use super::{name_column, ConstraintDef, SchemaProvider};
use crate::connection::Connection;
use crate::error::Result;

/// Introspects PostgreSQL databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresSchema;

impl SchemaProvider for PostgresSchema {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    async fn columns<C: Connection>(&self, conn: &C, table: &str) -> Result<Vec<String>> {
        let sql = "select column_name from information_schema.columns \
                   where table_name = %s order by ordinal_position";
        let rows = conn
            .fetch_rows(sql, Params::positional(vec![Param::value(table)]))
            .await?;
        Ok(name_column(rows))
    }

    async fn primary_keys<C: Connection>(&self, conn: &C, table: &str) -> Result<Vec<String>> {
        let sql = "select a.attname \
                   from pg_index i \
                   join pg_attribute a on a.attrelid = i.indrelid and a.attnum = any(i.indkey) \
                   where i.indrelid = %s::regclass and i.indisprimary";
        let rows = conn
            .fetch_rows(sql, Params::positional(vec![Param::value(table)]))
            .await?;
        Ok(name_column(rows))
    }

    async fn sequence_columns<C: Connection>(&self, conn: &C, table: &str) -> Result<Vec<String>> {
        let sql = "select column_name from information_schema.columns \
                   where table_name = %s and column_default like 'nextval%%' \
                   order by ordinal_position";
        let rows = conn
            .fetch_rows(sql, Params::positional(vec![Param::value(table)]))
            .await?;
        Ok(name_column(rows))
    }

    async fn unique_columns<C: Connection>(
        &self,
        conn: &C,
        table: &str,
    ) -> Result<Vec<Vec<String>>> {
        let sql = "select c.conname, a.attname \
                   from pg_constraint c \
                   cross join lateral unnest(c.conkey) with ordinality as k(attnum, ord) \
                   join pg_attribute a on a.attrelid = c.conrelid and a.attnum = k.attnum \
                   where c.conrelid = %s::regclass and c.contype = 'u' \
                   order by c.conname, k.ord";
        let rows = conn
            .fetch_rows(sql, Params::positional(vec![Param::value(table)]))
            .await?;

        let mut sets: Vec<(String, Vec<String>)> = Vec::new();
        for row in rows {
            let mut cells = row.into_iter();
            let (Some(SqlValue::Text(conname)), Some(SqlValue::Text(attname))) =
                (cells.next(), cells.next())
            else {
                continue;
            };
            match sets.last_mut() {
                Some((name, columns)) if *name == conname => columns.push(attname),
                _ => sets.push((conname, vec![attname])),
            }
        }
        Ok(sets.into_iter().map(|(_, columns)| columns).collect())
    }

    async fn constraint_definition<C: Connection>(
        &self,
        conn: &C,
        table: &str,
        name: &str,
    ) -> Result<Option<ConstraintDef>> {
        let sql = "select c.conname, pg_get_constraintdef(c.oid), a.attname \
                   from pg_constraint c \
                   cross join lateral unnest(c.conkey) with ordinality as k(attnum, ord) \
                   join pg_attribute a on a.attrelid = c.conrelid and a.attnum = k.attnum \
                   where c.conrelid = %s::regclass and c.conname = %s \
                   order by k.ord";
        let rows = conn
            .fetch_rows(
                sql,
                Params::positional(vec![Param::value(table), Param::value(name)]),
            )
            .await?;

        let mut def: Option<ConstraintDef> = None;
        for row in rows {
            let mut cells = row.into_iter();
            let (
                Some(SqlValue::Text(conname)),
                Some(SqlValue::Text(definition)),
                Some(SqlValue::Text(attname)),
            ) = (cells.next(), cells.next(), cells.next())
            else {
                continue;
            };
            match def.as_mut() {
                Some(d) => d.columns.push(attname),
                None => {
                    def = Some(ConstraintDef {
                        name: conname,
                        definition,
                        columns: vec![attname],
                    });
                }
            }
        }
        Ok(def)
    }

    async fn reset_sequence<C: Connection>(
        &self,
        conn: &C,
        table: &str,
        column: &str,
    ) -> Result<()> {
        let qtable = SqlDialect::Postgres.quote_identifier(table);
        let qcol = SqlDialect::Postgres.quote_identifier(column);
        let sql = format!(
            "select setval(pg_get_serial_sequence(%s, %s), coalesce(max({qcol}), 0) + 1, false) from {qtable}"
        );
        conn.fetch_rows(
            &sql,
            Params::positional(vec![Param::value(table), Param::value(column)]),
        )
        .await?;
        Ok(())
    }
}
