//! Multi-row statements sized to SQLite's bind parameter limit.

use rusqlite::types::Value;
use rusqlite::Connection;

use crate::error::StorageError;
use crate::executor;

/// Upper bound on bound parameters per statement. SQLite builds before
/// 3.32 default `SQLITE_MAX_VARIABLE_NUMBER` to 999.
pub const MAX_BIND_PARAMS: usize = 999;

/// `?, ?, ?` with `count` placeholders.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Builds `INSERT INTO t (a, b) VALUES (?, ?), (?, ?), ...` statements,
/// splitting the rows into as many statements as needed to stay under the
/// parameter limit.
#[derive(Debug, Clone)]
pub struct MultiRowInsert<'a> {
    table: &'a str,
    columns: &'a [&'a str],
    max_params: usize,
}

impl<'a> MultiRowInsert<'a> {
    pub fn new(table: &'a str, columns: &'a [&'a str]) -> Self {
        Self {
            table,
            columns,
            max_params: MAX_BIND_PARAMS,
        }
    }

    pub fn with_max_params(mut self, max_params: usize) -> Self {
        self.max_params = max_params;
        self
    }

    /// Rows per statement. Always at least one.
    pub fn rows_per_statement(&self) -> usize {
        (self.max_params / self.columns.len().max(1)).max(1)
    }

    /// The statement text for `rows` rows.
    pub fn statement(&self, rows: usize) -> String {
        let row = format!("({})", placeholders(self.columns.len()));
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            self.columns.join(", "),
            vec![row; rows].join(", ")
        )
    }

    /// Insert `rows`, returning the number of rows inserted and the number
    /// of statements it took.
    pub fn execute(
        &self,
        conn: &Connection,
        rows: &[Vec<Value>],
    ) -> Result<(usize, usize), StorageError> {
        if let Some(bad) = rows.iter().find(|row| row.len() != self.columns.len()) {
            return Err(StorageError::Validation(format!(
                "row has {} values, {} expects {}",
                bad.len(),
                self.table,
                self.columns.len()
            )));
        }

        let mut inserted = 0;
        let mut statements = 0;
        for chunk in rows.chunks(self.rows_per_statement()) {
            let args: Vec<Value> = chunk.iter().flatten().cloned().collect();
            inserted += executor::execute(
                conn,
                &self.statement(chunk.len()),
                &executor::as_args(&args),
            )?;
            statements += 1;
        }
        Ok((inserted, statements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[&str] = &["a", "b", "c"];

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER, b INTEGER, c TEXT);")
            .unwrap();
        conn
    }

    fn row(i: i64) -> Vec<Value> {
        vec![
            Value::Integer(i),
            Value::Integer(i * 10),
            Value::Text(format!("row {}", i)),
        ]
    }

    #[test]
    fn test_statement_text() {
        let insert = MultiRowInsert::new("t", COLUMNS);
        assert_eq!(
            insert.statement(2),
            "INSERT INTO t (a, b, c) VALUES (?, ?, ?), (?, ?, ?)"
        );
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(1), "?");
    }

    #[test]
    fn test_rows_per_statement() {
        assert_eq!(MultiRowInsert::new("t", COLUMNS).rows_per_statement(), 333);
        assert_eq!(
            MultiRowInsert::new("t", COLUMNS)
                .with_max_params(2)
                .rows_per_statement(),
            1
        );
    }

    #[test]
    fn test_single_statement_when_rows_fit() {
        let conn = open_test_conn();
        let rows: Vec<_> = (0..10).map(row).collect();
        let (inserted, statements) = MultiRowInsert::new("t", COLUMNS)
            .execute(&conn, &rows)
            .unwrap();
        assert_eq!((inserted, statements), (10, 1));
    }

    #[test]
    fn test_chunks_when_over_limit() {
        let conn = open_test_conn();
        let rows: Vec<_> = (0..10).map(row).collect();
        let (inserted, statements) = MultiRowInsert::new("t", COLUMNS)
            .with_max_params(9)
            .execute(&conn, &rows)
            .unwrap();
        assert_eq!((inserted, statements), (10, 4));

        let sum: i64 = conn
            .query_row("SELECT sum(b) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(sum, 450);
    }

    #[test]
    fn test_large_batch_respects_default_limit() {
        let conn = open_test_conn();
        let rows: Vec<_> = (0..1000).map(row).collect();
        let (inserted, statements) = MultiRowInsert::new("t", COLUMNS)
            .execute(&conn, &rows)
            .unwrap();
        assert_eq!((inserted, statements), (1000, 4));
    }

    #[test]
    fn test_empty_rows_do_nothing() {
        let conn = open_test_conn();
        let (inserted, statements) = MultiRowInsert::new("t", COLUMNS)
            .execute(&conn, &[])
            .unwrap();
        assert_eq!((inserted, statements), (0, 0));
    }

    #[test]
    fn test_rejects_misshapen_rows() {
        let conn = open_test_conn();
        let err = MultiRowInsert::new("t", COLUMNS)
            .execute(&conn, &[vec![Value::Integer(1)]])
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }
}
