//! Migration script store.
//!
//! A migration script is a UTF-8 SQL file whose name sorts into apply
//! order. Only the section between a `-- +migrate up` marker line and the
//! next `-- +migrate down` marker line (or end of file) is applied; the
//! markers are matched case-insensitively. Statements inside that section
//! are separated by lines holding nothing but `;`.

use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// File extension a script must carry to be treated as a migration.
pub const MIGRATION_EXTENSION: &str = ".sql";

const UP_MARKER: &str = "-- +migrate up";
const DOWN_MARKER: &str = "-- +migrate down";

/// Where migration scripts come from.
pub trait MigrationSource {
    /// Names of every file in the store, in no particular order.
    fn names(&self) -> Result<Vec<String>, StorageError>;

    /// Full content of the named script.
    fn read(&self, name: &str) -> Result<String, StorageError>;
}

/// Scripts compiled into the binary.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedMigrations {
    scripts: &'static [(&'static str, &'static str)],
}

const BUNDLED: &[(&str, &str)] = &[
    (
        "20190705190058-create-evidence-table.sql",
        include_str!("../migrations/20190705190058-create-evidence-table.sql"),
    ),
    (
        "20190716164302-create-tags-table.sql",
        include_str!("../migrations/20190716164302-create-tags-table.sql"),
    ),
    (
        "20200924183107-create-system-migrations-table.sql",
        include_str!("../migrations/20200924183107-create-system-migrations-table.sql"),
    ),
    (
        "20210301184523-create-servers-table.sql",
        include_str!("../migrations/20210301184523-create-servers-table.sql"),
    ),
    (
        "20210301184731-add-server-uuid-to-evidence.sql",
        include_str!("../migrations/20210301184731-add-server-uuid-to-evidence.sql"),
    ),
];

impl EmbeddedMigrations {
    /// The schema shipped with this build.
    pub fn bundled() -> Self {
        Self { scripts: BUNDLED }
    }

    /// An arbitrary static set of `(name, content)` scripts.
    pub fn from_static(scripts: &'static [(&'static str, &'static str)]) -> Self {
        Self { scripts }
    }
}

impl Default for EmbeddedMigrations {
    fn default() -> Self {
        Self::bundled()
    }
}

impl MigrationSource for EmbeddedMigrations {
    fn names(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.scripts.iter().map(|(name, _)| name.to_string()).collect())
    }

    fn read(&self, name: &str) -> Result<String, StorageError> {
        self.scripts
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, content)| content.to_string())
            .ok_or_else(|| StorageError::MigrationAssetMissing {
                name: name.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "not embedded in this build",
                ),
            })
    }
}

/// Scripts read from a directory at runtime.
#[derive(Debug, Clone)]
pub struct DirMigrations {
    dir: PathBuf,
}

impl DirMigrations {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MigrationSource for DirMigrations {
    fn names(&self) -> Result<Vec<String>, StorageError> {
        let asset_error = |source| StorageError::MigrationAssetMissing {
            name: self.dir.display().to_string(),
            source,
        };
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(asset_error)? {
            let entry = entry.map_err(asset_error)?;
            if entry.file_type().map_err(asset_error)?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(names)
    }

    fn read(&self, name: &str) -> Result<String, StorageError> {
        std::fs::read_to_string(self.dir.join(name)).map_err(|source| {
            StorageError::MigrationAssetMissing {
                name: name.to_string(),
                source,
            }
        })
    }
}

/// True if `name` looks like a migration script.
pub fn is_migration_script(name: &str) -> bool {
    name.ends_with(MIGRATION_EXTENSION)
}

/// Extract the statements of the "up" section of a migration script.
///
/// Blank chunks and chunks made only of `--` comment lines are dropped.
/// Each returned statement is trimmed.
pub fn extract_up_statements(content: &str) -> Vec<String> {
    let mut copying = false;
    let mut up_lines: Vec<&str> = Vec::new();
    for line in content.lines() {
        let marker = line.trim().to_lowercase();
        if marker == UP_MARKER {
            copying = true;
        } else if marker == DOWN_MARKER {
            if copying {
                break;
            }
        } else if copying {
            up_lines.push(line);
        }
    }

    let mut statements = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in up_lines {
        if line.trim() == ";" {
            push_statement(&mut statements, &current);
            current.clear();
        } else {
            current.push(line);
        }
    }
    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, lines: &[&str]) {
    let has_sql = lines.iter().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with("--")
    });
    if has_sql {
        statements.push(lines.join("\n").trim().to_string());
    }
}
