//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex. Opening a database runs
//! the migration engine before the handle is returned, so every `Database`
//! value points at an up-to-date schema.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use crate::error::StorageError;
use crate::migrations::{self, MigrationReport};
use crate::scripts::{EmbeddedMigrations, MigrationSource};

/// Oldest SQLite supporting multi-row `VALUES`, which tag sync relies on.
pub const MIN_SQLITE_VERSION: i32 = 3_007_011;

/// SQLite database handle.
pub struct Database {
    conn: Mutex<Connection>,
    migration_report: MigrationReport,
}

impl Database {
    /// Open (or create) a database at the given path using the bundled
    /// migration scripts.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Self::open_with_migrations(path, &EmbeddedMigrations::bundled())
    }

    /// Open (or create) a database at the given path, migrating it with
    /// scripts from `source`.
    ///
    /// Configures WAL mode, synchronous=NORMAL and foreign keys.
    pub fn open_with_migrations(
        path: &Path,
        source: &dyn MigrationSource,
    ) -> Result<Self, StorageError> {
        check_driver()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|source| StorageError::Connection {
            path: path.display().to_string(),
            source,
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| StorageError::query("PRAGMA", e))?;

        info!("Database opened at {}", path.display());
        Self::migrated(conn, source)
    }

    /// Open an in-memory database with the bundled schema (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::in_memory_with_migrations(&EmbeddedMigrations::bundled())
    }

    pub fn in_memory_with_migrations(source: &dyn MigrationSource) -> Result<Self, StorageError> {
        check_driver()?;

        let conn = Connection::open_in_memory().map_err(|source| StorageError::Connection {
            path: ":memory:".to_string(),
            source,
        })?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| StorageError::query("PRAGMA foreign_keys = ON", e))?;

        Self::migrated(conn, source)
    }

    fn migrated(conn: Connection, source: &dyn MigrationSource) -> Result<Self, StorageError> {
        let migration_report = migrations::run_migrations(&conn, source)?;
        Ok(Self {
            conn: Mutex::new(conn),
            migration_report,
        })
    }

    /// What the migration engine did when this database was opened.
    pub fn migration_report(&self) -> &MigrationReport {
        &self.migration_report
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&conn)
    }

    pub fn has_applied_system_migration(&self, name: &str) -> Result<bool, StorageError> {
        self.with_conn(|conn| migrations::has_applied_system_migration(conn, name))
    }

    pub fn apply_system_migration(&self, name: &str) -> Result<i64, StorageError> {
        self.with_conn(|conn| migrations::apply_system_migration(conn, name))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("migration_report", &self.migration_report)
            .finish()
    }
}

fn check_driver() -> Result<(), StorageError> {
    if rusqlite::version_number() < MIN_SQLITE_VERSION {
        return Err(StorageError::DriverUnavailable {
            found: rusqlite::version().to_string(),
            required: "3.7.11".to_string(),
        });
    }
    Ok(())
}
