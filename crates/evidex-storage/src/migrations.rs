//! Schema migration engine.
//!
//! Applies every known migration script that is not yet recorded in the
//! `migrations` history table, in ascending name order, one chunk at a
//! time. A chunk may hold several statements and all of them run. A script
//! is recorded as applied only after all of its statements succeeded. There is no enclosing transaction: if a statement fails, the
//! statements before it stay committed and the whole script is attempted
//! again on the next run.
//!
//! The `system_migrations` table is a separate set of one-shot flags for
//! application-level upgrade steps.

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::executor::{self, TIMESTAMP_FORMAT};
use crate::scripts::{extract_up_statements, is_migration_script, MigrationSource};

/// What a migration run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Scripts applied during this run, in apply order.
    pub applied: Vec<String>,
    /// Script statements executed during this run.
    pub statements_executed: usize,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Bring the schema up to date with `source`.
pub fn run_migrations(
    conn: &Connection,
    source: &dyn MigrationSource,
) -> Result<MigrationReport, StorageError> {
    info!("Checking database state");
    ensure_history_table(conn)?;

    let pending = unapplied_migrations(conn, source)?;
    let mut report = MigrationReport::default();

    for name in pending {
        let content = source.read(&name)?;
        info!(migration = %name, "Applying DB migration");
        for statement in extract_up_statements(&content) {
            debug!(migration = %name, statement = %statement, "Executing migration statement");
            executor::execute_batch(conn, &statement).map_err(|e| {
                warn!(migration = %name, error = %e, "Migration failed");
                e
            })?;
            report.statements_executed += 1;
        }
        let applied_at = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        executor::insert(
            conn,
            "INSERT INTO migrations (migration_name, applied_at) VALUES (?, ?)",
            &[&name, &applied_at],
        )?;
        report.applied.push(name);
    }

    info!(
        applied = report.applied.len(),
        statements = report.statements_executed,
        "All DB migrations applied"
    );
    Ok(report)
}

/// Migration scripts known to `source` but not recorded as applied, sorted
/// by name.
///
/// Fails with [`StorageError::BadDatabaseState`] if the history names a
/// migration `source` does not know.
pub fn unapplied_migrations(
    conn: &Connection,
    source: &dyn MigrationSource,
) -> Result<Vec<String>, StorageError> {
    let mut known: Vec<String> = source
        .names()?
        .into_iter()
        .filter(|name| is_migration_script(name))
        .collect();
    known.sort();
    known.dedup();

    let applied = applied_migrations(conn)?;

    let unknown: Vec<String> = applied
        .iter()
        .filter(|name| known.binary_search(name).is_err())
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(StorageError::BadDatabaseState { unknown });
    }

    Ok(known
        .into_iter()
        .filter(|name| !applied.contains(name))
        .collect())
}

/// Names recorded in the history table. Empty when the table does not exist.
pub fn applied_migrations(conn: &Connection) -> Result<Vec<String>, StorageError> {
    if !table_exists(conn, "migrations")? {
        return Ok(Vec::new());
    }
    executor::query_rows(
        conn,
        "SELECT migration_name FROM migrations ORDER BY migration_name",
        &[],
        |row| row.get(0),
    )
}

fn ensure_history_table(conn: &Connection) -> Result<(), StorageError> {
    executor::execute(
        conn,
        "CREATE TABLE IF NOT EXISTS migrations (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            migration_name TEXT NOT NULL UNIQUE,
            applied_at     DATETIME NOT NULL
        )",
        &[],
    )?;
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool, StorageError> {
    let count: Option<i64> = executor::single_field(
        conn,
        "SELECT count(name) FROM sqlite_master WHERE type = 'table' AND name = ?",
        &[&table],
    )?;
    Ok(count.unwrap_or(0) > 0)
}

// =============================================================================
// System migrations
// =============================================================================

/// Whether the one-shot upgrade step `name` has been recorded.
pub fn has_applied_system_migration(conn: &Connection, name: &str) -> Result<bool, StorageError> {
    let count: Option<i64> = executor::single_field(
        conn,
        "SELECT count(migration_name) FROM system_migrations WHERE migration_name = ?",
        &[&name],
    )?;
    Ok(count.unwrap_or(0) > 0)
}

/// Record the one-shot upgrade step `name`, returning its row id. Recording
/// an already-recorded step returns the existing row id.
pub fn apply_system_migration(conn: &Connection, name: &str) -> Result<i64, StorageError> {
    let existing: Option<i64> = executor::single_field(
        conn,
        "SELECT id FROM system_migrations WHERE migration_name = ?",
        &[&name],
    )?;
    if let Some(id) = existing {
        debug!(migration = name, "System migration already recorded");
        return Ok(id);
    }
    let id = executor::insert(
        conn,
        "INSERT INTO system_migrations (migration_name) VALUES (?)",
        &[&name],
    )?;
    info!(migration = name, "System migration recorded");
    Ok(id)
}
