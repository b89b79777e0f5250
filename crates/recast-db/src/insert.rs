//! Batched inserts with column reconciliation.
//!
//! Incoming rows are dictionaries that may carry wrong-case keys or
//! columns the live table does not have. Reconciliation maps them onto
//! the table's actual columns before any SQL is built.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use recast_sql_core::{SqlDialect, SqlValue};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::Result;
use crate::schema::{CaseFold, SchemaProvider};

/// One incoming row: column name to value.
pub type Row = BTreeMap<String, SqlValue>;

/// Rows mapped onto the live table: a fixed column list plus rows keyed
/// by those canonical names.
pub(crate) struct ReconciledBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Maps rows onto the live column list, case-insensitively. Unknown
/// columns are dropped with a log line; rows left empty are dropped too.
/// Returns `None` when nothing survives.
pub(crate) fn reconcile_batch(live_columns: &[String], rows: &[Row]) -> Option<ReconciledBatch> {
    let fold = CaseFold::new(live_columns);
    let mut used: BTreeSet<String> = BTreeSet::new();
    let mut kept: Vec<Row> = Vec::with_capacity(rows.len());

    for row in rows {
        let mut mapped = Row::new();
        for (key, value) in row {
            if let Some(canonical) = fold.canonical(key) {
                used.insert(canonical.to_string());
                mapped.insert(canonical.to_string(), value.clone());
            } else {
                debug!(column = %key, "dropping column not present in table");
            }
        }
        if mapped.is_empty() {
            debug!("dropping row with no usable columns");
        } else {
            kept.push(mapped);
        }
    }
    if kept.is_empty() {
        return None;
    }

    // Keep the table's own column order.
    let columns: Vec<String> = live_columns
        .iter()
        .filter(|c| used.contains(*c))
        .cloned()
        .collect();
    Some(ReconciledBatch {
        columns,
        rows: kept,
    })
}

/// Renders the INSERT statement for a reconciled batch.
pub(crate) fn build_insert_sql(dialect: SqlDialect, table: &str, columns: &[String]) -> String {
    let quoted: Vec<String> = columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect();
    let markers = vec![dialect.marker(); columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.quote_identifier(table),
        quoted.join(", "),
        markers
    )
}

/// Bind values for one row in column order; absent columns bind NULL.
pub(crate) fn row_params(columns: &[String], row: &Row) -> Vec<SqlValue> {
    columns
        .iter()
        .map(|c| row.get(c).cloned().unwrap_or(SqlValue::Null))
        .collect()
}

/// Executes the plain INSERT for a reconciled batch.
pub(crate) async fn insert_reconciled<C: Connection>(
    conn: &C,
    table: &str,
    batch: &ReconciledBatch,
) -> Result<u64> {
    let sql = build_insert_sql(conn.dialect(), table, &batch.columns);
    let bind_rows: Vec<Vec<SqlValue>> = batch
        .rows
        .iter()
        .map(|row| row_params(&batch.columns, row))
        .collect();
    conn.execute_batch(&sql, &bind_rows).await
}

/// Inserts rows after reconciling them against the live table. Returns
/// the number of rows written; an empty or fully-dropped batch writes
/// nothing and returns zero.
///
/// # Errors
///
/// Returns [`crate::error::DbError`] on introspection or driver failure.
pub async fn insert_rows<C, P>(conn: &C, schema: &P, table: &str, rows: &[Row]) -> Result<u64>
where
    C: Connection,
    P: SchemaProvider,
{
    if rows.is_empty() {
        debug!(table, "insert called with no rows");
        return Ok(0);
    }
    let live = schema.columns(conn, table).await?;
    let Some(batch) = reconcile_batch(&live, rows) else {
        warn!(table, "no rows left after column reconciliation");
        return Ok(0);
    };
    let affected = insert_reconciled(conn, table, &batch).await?;
    debug!(table, rows = batch.rows.len(), affected, "insert complete");
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live() -> Vec<String> {
        vec!["Id".to_string(), "Name".to_string(), "Value".to_string()]
    }

    fn row(pairs: &[(&str, SqlValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_reconcile_maps_case_and_drops_unknown() {
        let rows = vec![row(&[
            ("id", SqlValue::Int(1)),
            ("NAME", SqlValue::Text("x".into())),
            ("bogus", SqlValue::Int(9)),
        ])];
        let batch = reconcile_batch(&live(), &rows).unwrap();
        assert_eq!(batch.columns, vec!["Id", "Name"]);
        assert_eq!(batch.rows[0].get("Id"), Some(&SqlValue::Int(1)));
        assert!(!batch.rows[0].contains_key("bogus"));
    }

    #[test]
    fn test_reconcile_drops_empty_rows() {
        let rows = vec![
            row(&[("bogus", SqlValue::Int(1))]),
            row(&[("id", SqlValue::Int(2))]),
        ];
        let batch = reconcile_batch(&live(), &rows).unwrap();
        assert_eq!(batch.rows.len(), 1);
    }

    #[test]
    fn test_reconcile_all_dropped_is_none() {
        let rows = vec![row(&[("bogus", SqlValue::Int(1))])];
        assert!(reconcile_batch(&live(), &rows).is_none());
    }

    #[test]
    fn test_build_insert_sql() {
        let columns = vec!["id".to_string(), "name".to_string()];
        assert_eq!(
            build_insert_sql(SqlDialect::Sqlite, "t", &columns),
            "INSERT INTO \"t\" (\"id\", \"name\") VALUES (?, ?)"
        );
        assert_eq!(
            build_insert_sql(SqlDialect::Postgres, "t", &columns),
            "INSERT INTO \"t\" (\"id\", \"name\") VALUES (%s, %s)"
        );
    }

    #[test]
    fn test_row_params_fills_null() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let r = row(&[("a", SqlValue::Int(1))]);
        assert_eq!(
            row_params(&columns, &r),
            vec![SqlValue::Int(1), SqlValue::Null]
        );
    }
}
