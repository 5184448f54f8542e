//! Parameterized statement execution.
//!
//! Every statement goes through `prepare` + positional `?` binding; the
//! arguments are bound in slice order. Any prepare, bind or step failure is
//! surfaced as [`StorageError::Query`] carrying the statement and the native
//! rusqlite error. No transaction is opened here: each call commits on its
//! own.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, ToSql, Type, Value};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::trace;

use crate::error::StorageError;

/// Format SQLite's `datetime('now')` produces; all timestamps are UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Run a statement that returns no rows, returning the affected row count.
pub fn execute(conn: &Connection, sql: &str, args: &[&dyn ToSql]) -> Result<usize, StorageError> {
    trace!(statement = sql, args = args.len(), "execute");
    let mut stmt = conn.prepare(sql).map_err(|e| StorageError::query(sql, e))?;
    stmt.execute(args).map_err(|e| StorageError::query(sql, e))
}

/// Run every statement in `sql`, discarding any rows they return. Used for
/// migration chunks, which may hold several statements or a query.
pub fn execute_batch(conn: &Connection, sql: &str) -> Result<(), StorageError> {
    trace!(statement = sql, "execute_batch");
    conn.execute_batch(sql).map_err(|e| StorageError::query(sql, e))
}

/// Run an INSERT and return the id of the inserted row.
pub fn insert(conn: &Connection, sql: &str, args: &[&dyn ToSql]) -> Result<i64, StorageError> {
    execute(conn, sql, args)?;
    Ok(conn.last_insert_rowid())
}

/// Run a query and map every result row.
pub fn query_rows<T, F>(
    conn: &Connection,
    sql: &str,
    args: &[&dyn ToSql],
    map: F,
) -> Result<Vec<T>, StorageError>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    trace!(statement = sql, args = args.len(), "query");
    let mut stmt = conn.prepare(sql).map_err(|e| StorageError::query(sql, e))?;
    let rows = stmt
        .query_map(args, map)
        .map_err(|e| StorageError::query(sql, e))?;
    rows.collect::<rusqlite::Result<Vec<T>>>()
        .map_err(|e| StorageError::query(sql, e))
}

/// Run a query and map its first row, if any.
pub fn query_single<T, F>(
    conn: &Connection,
    sql: &str,
    args: &[&dyn ToSql],
    map: F,
) -> Result<Option<T>, StorageError>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    trace!(statement = sql, args = args.len(), "query_single");
    let mut stmt = conn.prepare(sql).map_err(|e| StorageError::query(sql, e))?;
    stmt.query_row(args, map)
        .optional()
        .map_err(|e| StorageError::query(sql, e))
}

/// Return the first column of the first row, or `None` when there are no rows.
pub fn single_field<T: FromSql>(
    conn: &Connection,
    sql: &str,
    args: &[&dyn ToSql],
) -> Result<Option<T>, StorageError> {
    query_single(conn, sql, args, |row| row.get(0))
}

/// Borrow owned values as bind arguments.
pub fn as_args(values: &[Value]) -> Vec<&dyn ToSql> {
    values.iter().map(|v| v as &dyn ToSql).collect()
}

/// Read a non-null timestamp column.
pub fn timestamp_column(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    parse_timestamp(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column_index(row, column), Type::Text, e.into())
    })
}

/// Read a nullable timestamp column.
pub fn optional_timestamp_column(
    row: &Row<'_>,
    column: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    match raw {
        Some(raw) if !raw.is_empty() => parse_timestamp(&raw).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column_index(row, column),
                Type::Text,
                e.into(),
            )
        }),
        _ => Ok(None),
    }
}

/// Parse a stored timestamp. Accepts SQLite's `YYYY-MM-DD HH:MM:SS` (with
/// optional fractional seconds) as UTC, and RFC 3339.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        Ok(naive) => Ok(naive.and_utc()),
        Err(_) => DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)),
    }
}

fn column_index(row: &Row<'_>, column: &str) -> usize {
    row.as_ref().column_index(column).unwrap_or(0)
}
