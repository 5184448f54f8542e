//! Repository implementations for SQLite-backed persistence.
//!
//! Provides ServerRepository and EvidenceRepository, operating on the
//! Database struct through the statement executor.

use std::collections::HashSet;
use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::Row;
use tracing::{debug, info};

use evidex_core::filters::EvidenceFilters;
use evidex_core::types::{Evidence, NewServer, Server, Tag};

use crate::batch::{placeholders, MultiRowInsert, MAX_BIND_PARAMS};
use crate::db::Database;
use crate::error::StorageError;
use crate::executor::{self, optional_timestamp_column, timestamp_column};
use crate::filter::{build_query, EVIDENCE_COLUMNS};

const SERVER_COLUMNS: &str = "uuid, server_name, access_key, secret_key, host_path, deleted_at";

const TAG_COLUMNS: &[&str] = &["evidence_id", "tag_id", "name"];

// =============================================================================
// Servers
// =============================================================================

/// Repository for registered servers.
pub struct ServerRepository {
    db: Arc<Database>,
}

impl ServerRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Register a new server, returning its row id.
    ///
    /// The name and uuid must be non-blank.
    pub fn create(&self, server: &NewServer) -> Result<i64, StorageError> {
        if server.server_name.trim().is_empty() || server.server_uuid.trim().is_empty() {
            return Err(StorageError::Validation(
                "New servers require a non-empty name and uuid".to_string(),
            ));
        }
        let id = self.db.with_conn(|conn| {
            executor::insert(
                conn,
                "INSERT INTO servers (uuid, server_name, access_key, secret_key, host_path)
                 VALUES (?, ?, ?, ?, ?)",
                &[
                    &server.server_uuid,
                    &server.server_name,
                    &server.access_key,
                    &server.secret_key,
                    &server.host_path,
                ],
            )
        })?;
        info!(server_uuid = %server.server_uuid, "Server created");
        Ok(id)
    }

    /// Find a server by uuid, including soft-deleted ones.
    pub fn get(&self, server_uuid: &str) -> Result<Option<Server>, StorageError> {
        self.db.with_conn(|conn| {
            executor::query_single(
                conn,
                &format!("SELECT {} FROM servers WHERE uuid = ?", SERVER_COLUMNS),
                &[&server_uuid],
                row_to_server,
            )
        })
    }

    /// List servers, optionally including soft-deleted ones.
    pub fn list(&self, include_deleted: bool) -> Result<Vec<Server>, StorageError> {
        let mut sql = format!("SELECT {} FROM servers", SERVER_COLUMNS);
        if !include_deleted {
            sql.push_str(" WHERE deleted_at IS NULL");
        }
        sql.push_str(" ORDER BY id");
        self.db
            .with_conn(|conn| executor::query_rows(conn, &sql, &[], row_to_server))
    }

    /// Update the connection details of a server, leaving its name alone.
    pub fn update_details(
        &self,
        server_uuid: &str,
        access_key: &str,
        secret_key: &str,
        host_path: &str,
    ) -> Result<(), StorageError> {
        self.db.with_conn(|conn| {
            executor::execute(
                conn,
                "UPDATE servers SET access_key = ?, secret_key = ?, host_path = ? WHERE uuid = ?",
                &[&access_key, &secret_key, &host_path, &server_uuid],
            )
        })?;
        Ok(())
    }

    /// Update the name and connection details of a server.
    pub fn update_full_details(
        &self,
        server_uuid: &str,
        server_name: &str,
        access_key: &str,
        secret_key: &str,
        host_path: &str,
    ) -> Result<(), StorageError> {
        if server_name.trim().is_empty() {
            return Err(StorageError::Validation(
                "Servers require a non-empty name".to_string(),
            ));
        }
        self.db.with_conn(|conn| {
            executor::execute(
                conn,
                "UPDATE servers SET server_name = ?, access_key = ?, secret_key = ?, host_path = ?
                 WHERE uuid = ?",
                &[&server_name, &access_key, &secret_key, &host_path, &server_uuid],
            )
        })?;
        Ok(())
    }

    /// Soft-delete a server.
    pub fn delete(&self, server_uuid: &str) -> Result<(), StorageError> {
        self.db.with_conn(|conn| {
            executor::execute(
                conn,
                "UPDATE servers SET deleted_at = datetime('now') WHERE uuid = ?",
                &[&server_uuid],
            )
        })?;
        info!(server_uuid, "Server deleted");
        Ok(())
    }

    /// Undo a soft delete.
    pub fn restore(&self, server_uuid: &str) -> Result<(), StorageError> {
        self.db.with_conn(|conn| {
            executor::execute(
                conn,
                "UPDATE servers SET deleted_at = NULL WHERE uuid = ?",
                &[&server_uuid],
            )
        })?;
        info!(server_uuid, "Server restored");
        Ok(())
    }

    pub fn exists(&self, server_uuid: &str) -> Result<bool, StorageError> {
        let count: Option<i64> = self.db.with_conn(|conn| {
            executor::single_field(
                conn,
                "SELECT count(uuid) FROM servers WHERE uuid = ?",
                &[&server_uuid],
            )
        })?;
        Ok(count.unwrap_or(0) > 0)
    }

    pub fn access_key(&self, server_uuid: &str) -> Result<Option<String>, StorageError> {
        self.field("SELECT access_key FROM servers WHERE uuid = ?", server_uuid)
    }

    pub fn secret_key(&self, server_uuid: &str) -> Result<Option<String>, StorageError> {
        self.field("SELECT secret_key FROM servers WHERE uuid = ?", server_uuid)
    }

    pub fn host_path(&self, server_uuid: &str) -> Result<Option<String>, StorageError> {
        self.field("SELECT host_path FROM servers WHERE uuid = ?", server_uuid)
    }

    pub fn server_name(&self, server_uuid: &str) -> Result<Option<String>, StorageError> {
        self.field("SELECT server_name FROM servers WHERE uuid = ?", server_uuid)
    }

    fn field(&self, sql: &str, server_uuid: &str) -> Result<Option<String>, StorageError> {
        self.db
            .with_conn(|conn| executor::single_field(conn, sql, &[&server_uuid]))
    }
}

fn row_to_server(row: &Row<'_>) -> rusqlite::Result<Server> {
    Ok(Server {
        server_uuid: row.get("uuid")?,
        server_name: row.get("server_name")?,
        access_key: row.get("access_key")?,
        secret_key: row.get("secret_key")?,
        host_path: row.get("host_path")?,
        deleted_at: optional_timestamp_column(row, "deleted_at")?,
    })
}

// =============================================================================
// Evidence
// =============================================================================

/// Net effect of a tag sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagSync {
    pub removed: usize,
    pub inserted: usize,
}

impl TagSync {
    pub fn is_noop(&self) -> bool {
        self.removed == 0 && self.inserted == 0
    }
}

/// Repository for evidence and its tags.
pub struct EvidenceRepository {
    db: Arc<Database>,
}

impl EvidenceRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record a new piece of evidence, stamped with the current time.
    pub fn create(
        &self,
        path: &str,
        operation_slug: &str,
        server_uuid: &str,
        content_type: &str,
    ) -> Result<i64, StorageError> {
        let id = self.db.with_conn(|conn| {
            executor::insert(
                conn,
                "INSERT INTO evidence (path, operation_slug, server_uuid, content_type, recorded_date)
                 VALUES (?, ?, ?, ?, datetime('now'))",
                &[&path, &operation_slug, &server_uuid, &content_type],
            )
        })?;
        debug!(evidence_id = id, path, "Evidence created");
        Ok(id)
    }

    /// Find evidence by id, with its tags.
    pub fn get(&self, evidence_id: i64) -> Result<Option<Evidence>, StorageError> {
        self.db.with_conn(|conn| {
            let found = executor::query_single(
                conn,
                &format!("SELECT {} FROM evidence WHERE id = ? LIMIT 1", EVIDENCE_COLUMNS),
                &[&evidence_id],
                row_to_evidence,
            )?;
            match found {
                Some(mut evidence) => {
                    evidence.tags = query_tags(conn, evidence_id)?;
                    Ok(Some(evidence))
                }
                None => {
                    debug!(evidence_id, "Could not find evidence");
                    Ok(None)
                }
            }
        })
    }

    /// List evidence matching `filters`. Tags are not loaded.
    pub fn list(&self, filters: &EvidenceFilters) -> Result<Vec<Evidence>, StorageError> {
        let query = build_query(filters);
        self.db.with_conn(|conn| {
            executor::query_rows(
                conn,
                &query.sql,
                &executor::as_args(&query.args),
                row_to_evidence,
            )
        })
    }

    pub fn update_description(
        &self,
        evidence_id: i64,
        description: &str,
    ) -> Result<(), StorageError> {
        self.db.with_conn(|conn| {
            executor::execute(
                conn,
                "UPDATE evidence SET description = ? WHERE id = ?",
                &[&description, &evidence_id],
            )
        })?;
        Ok(())
    }

    /// Record a capture or upload failure. An empty string clears it.
    pub fn record_error(&self, evidence_id: i64, error_text: &str) -> Result<(), StorageError> {
        self.db.with_conn(|conn| {
            executor::execute(
                conn,
                "UPDATE evidence SET error = ? WHERE id = ?",
                &[&error_text, &evidence_id],
            )
        })?;
        Ok(())
    }

    /// Mark evidence as uploaded, stamping the current time.
    pub fn mark_submitted(&self, evidence_id: i64) -> Result<(), StorageError> {
        self.db.with_conn(|conn| {
            executor::execute(
                conn,
                "UPDATE evidence SET upload_date = datetime('now') WHERE id = ?",
                &[&evidence_id],
            )
        })?;
        debug!(evidence_id, "Evidence submitted");
        Ok(())
    }

    /// Permanently delete evidence and its tags.
    pub fn delete(&self, evidence_id: i64) -> Result<(), StorageError> {
        self.db.with_conn(|conn| {
            executor::execute(conn, "DELETE FROM tags WHERE evidence_id = ?", &[&evidence_id])?;
            executor::execute(conn, "DELETE FROM evidence WHERE id = ?", &[&evidence_id])
        })?;
        info!(evidence_id, "Evidence deleted");
        Ok(())
    }

    pub fn tags(&self, evidence_id: i64) -> Result<Vec<Tag>, StorageError> {
        self.db.with_conn(|conn| query_tags(conn, evidence_id))
    }

    /// Make the stored tags of `evidence_id` mirror `tags`.
    ///
    /// Stored tags whose server tag id is not in `tags` are deleted. Tags
    /// already stored are left alone so their local ids survive. The rest
    /// are inserted with multi-row INSERTs.
    pub fn set_tags(&self, evidence_id: i64, tags: &[Tag]) -> Result<TagSync, StorageError> {
        let wanted: HashSet<i64> = tags.iter().map(|t| t.server_tag_id).collect();

        self.db.with_conn(|conn| {
            let mut sync = TagSync::default();

            let stored = query_tags(conn, evidence_id)?;
            let stale: Vec<i64> = stored
                .iter()
                .filter(|t| !wanted.contains(&t.server_tag_id))
                .map(|t| t.id)
                .collect();
            // One slot is taken by the evidence id.
            for chunk in stale.chunks(MAX_BIND_PARAMS - 1) {
                let sql = format!(
                    "DELETE FROM tags WHERE evidence_id = ? AND id IN ({})",
                    placeholders(chunk.len())
                );
                let mut args: Vec<Value> = vec![Value::Integer(evidence_id)];
                args.extend(chunk.iter().map(|id| Value::Integer(*id)));
                sync.removed += executor::execute(conn, &sql, &executor::as_args(&args))?;
            }

            let surviving: HashSet<i64> = executor::query_rows(
                conn,
                "SELECT tag_id FROM tags WHERE evidence_id = ?",
                &[&evidence_id],
                |row| row.get(0),
            )?
            .into_iter()
            .collect();

            let mut seen = HashSet::new();
            let rows: Vec<Vec<Value>> = tags
                .iter()
                .filter(|t| !surviving.contains(&t.server_tag_id))
                .filter(|t| seen.insert(t.server_tag_id))
                .map(|t| {
                    vec![
                        Value::Integer(evidence_id),
                        Value::Integer(t.server_tag_id),
                        Value::Text(t.tag_name.clone()),
                    ]
                })
                .collect();
            let (inserted, _) = MultiRowInsert::new("tags", TAG_COLUMNS).execute(conn, &rows)?;
            sync.inserted = inserted;

            debug!(
                evidence_id,
                removed = sync.removed,
                inserted = sync.inserted,
                "Evidence tags synced"
            );
            Ok(sync)
        })
    }
}

fn query_tags(conn: &rusqlite::Connection, evidence_id: i64) -> Result<Vec<Tag>, StorageError> {
    executor::query_rows(
        conn,
        "SELECT id, tag_id, name FROM tags WHERE evidence_id = ? ORDER BY id",
        &[&evidence_id],
        |row| Ok(Tag::new(row.get("id")?, row.get("tag_id")?, row.get::<_, String>("name")?)),
    )
}

fn row_to_evidence(row: &Row<'_>) -> rusqlite::Result<Evidence> {
    Ok(Evidence {
        id: row.get("id")?,
        path: row.get("path")?,
        operation_slug: row.get("operation_slug")?,
        server_uuid: row.get("server_uuid")?,
        content_type: row.get("content_type")?,
        description: row.get("description")?,
        error_text: row.get("error")?,
        recorded_date: timestamp_column(row, "recorded_date")?,
        upload_date: optional_timestamp_column(row, "upload_date")?,
        tags: Vec::new(),
    })
}
