//! Evidex Storage crate - SQLite persistence for servers, evidence and tags.
//!
//! Provides the migration script store and engine, a parameterized
//! statement executor, the evidence filter query builder and repository
//! implementations for servers and evidence.

pub mod batch;
pub mod db;
pub mod error;
pub mod executor;
pub mod filter;
pub mod migrations;
pub mod repository;
pub mod scripts;

pub use batch::{MultiRowInsert, MAX_BIND_PARAMS};
pub use db::Database;
pub use error::StorageError;
pub use filter::{build_query, FilterQuery};
pub use migrations::{run_migrations, unapplied_migrations, MigrationReport};
pub use repository::{EvidenceRepository, ServerRepository, TagSync};
pub use scripts::{extract_up_statements, DirMigrations, EmbeddedMigrations, MigrationSource};
