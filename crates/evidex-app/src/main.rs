//! Evidex application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite database, applying pending migrations
//! 4. Load and upgrade user settings
//! 5. Dispatch the requested command

mod cli;
mod commands;

use std::sync::Arc;

use clap::Parser;

use evidex_core::config::EvidexConfig;
use evidex_core::settings::AppSettings;
use evidex_storage::{Database, DirMigrations};

use cli::{expand_home, CliArgs};
use commands::App;

/// One-shot step that moves pre-server settings under the legacy server.
const SETTINGS_UPGRADE_MIGRATION: &str = "upgrade-settings-v2";

const SETTINGS_FILE: &str = "settings.toml";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let config = EvidexConfig::load_or_create(&config_file)?;

    // Tracing.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting Evidex v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = args.resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join(&config.storage.db_file);
    let db = match config.storage.migrations_dir {
        Some(ref dir) => {
            let source = DirMigrations::new(expand_home(dir));
            tracing::debug!(dir = %source.dir().display(), "Using migration scripts from disk");
            Database::open_with_migrations(&db_path, &source)?
        }
        None => Database::open(&db_path)?,
    };
    let db = Arc::new(db);

    // Settings.
    let mut settings = AppSettings::load(&data_dir.join(SETTINGS_FILE))?;
    if !db.has_applied_system_migration(SETTINGS_UPGRADE_MIGRATION)? {
        if settings.upgrade() {
            settings.save()?;
        }
        db.apply_system_migration(SETTINGS_UPGRADE_MIGRATION)?;
    }

    let evidence_dir = expand_home(&config.evidence.repo_dir);
    let mut app = App::new(db, settings, evidence_dir);
    commands::register_legacy_server(&app)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = commands::run(&mut app, args.command, &mut out) {
        tracing::error!(error = %e, "Command failed");
        return Err(e.into());
    }
    Ok(())
}
