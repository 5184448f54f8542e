//! CLI argument definitions for the Evidex application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use evidex_core::types::Tag;
use evidex_core::{EvidexError, Result};

/// Evidex - local evidence store for security assessments.
#[derive(Parser, Debug)]
#[command(name = "evidex", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the database and settings.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Apply pending schema migrations and report what ran.
    Migrate,

    /// Manage registered servers.
    #[command(subcommand)]
    Server(ServerCommand),

    /// Manage the active operation.
    #[command(subcommand)]
    Operation(OperationCommand),

    /// Record and inspect evidence.
    #[command(subcommand)]
    Evidence(EvidenceCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    /// List servers.
    List {
        /// Include deleted servers.
        #[arg(long)]
        all: bool,
    },
    /// Register a server.
    Add(AddServerArgs),
    /// Soft-delete a server.
    Remove { uuid: String },
    /// Undo a server removal.
    Restore { uuid: String },
    /// Make a server the active one.
    Use { uuid: String },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct AddServerArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub host: String,
    /// Server uuid. Generated when omitted.
    #[arg(long)]
    pub uuid: Option<String>,
    #[arg(long, default_value = "")]
    pub access_key: String,
    #[arg(long, default_value = "")]
    pub secret_key: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum OperationCommand {
    /// Show the active operation of the active server.
    Show,
    /// Set the active operation of the active server.
    Use {
        slug: String,
        /// Display name. Defaults to the slug.
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum EvidenceCommand {
    /// Record a new piece of evidence.
    Add {
        #[arg(long)]
        path: String,
        /// Operation slug. Defaults to the active operation.
        #[arg(long)]
        op: Option<String>,
        /// Content type, e.g. image or codeblock.
        #[arg(long = "type")]
        content_type: String,
        /// Server uuid. Defaults to the active server.
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// List evidence, e.g. `--filter "err:no op:acme from:2021-01-01"`.
    List {
        #[arg(long, default_value = "")]
        filter: String,
        #[arg(long)]
        json: bool,
    },
    /// Show one piece of evidence with its tags.
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Mark evidence as uploaded.
    Submit { id: i64 },
    /// Record (or with an empty message, clear) an upload error.
    Fail {
        id: i64,
        #[arg(default_value = "")]
        message: String,
    },
    /// Permanently delete evidence.
    Delete { id: i64 },
    /// Replace the tags of evidence with `TAG_ID:NAME` pairs.
    Tag {
        id: i64,
        #[arg(value_parser = parse_tag)]
        tags: Vec<Tag>,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > EVIDEX_CONFIG env var > platform default (~/.evidex/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("EVIDEX_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory path.
    ///
    /// Priority: --data-dir flag > config file value.
    pub fn resolve_data_dir(&self, config_data_dir: &str) -> PathBuf {
        match self.data_dir {
            Some(ref p) => p.clone(),
            None => expand_home(config_data_dir),
        }
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Parse a `TAG_ID:NAME` pair into a tag not yet stored locally.
pub fn parse_tag(raw: &str) -> Result<Tag> {
    let (id, name) = raw
        .split_once(':')
        .ok_or_else(|| EvidexError::Validation(format!("expected TAG_ID:NAME, got {:?}", raw)))?;
    let server_tag_id = id
        .trim()
        .parse::<i64>()
        .map_err(|_| EvidexError::Validation(format!("tag id {:?} is not a number", id)))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(EvidexError::Validation(format!("tag {} has no name", server_tag_id)));
    }
    Ok(Tag::from_server(server_tag_id, name))
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") || path.starts_with("~\\") {
        PathBuf::from(home_dir()).join(&path[2..])
    } else {
        PathBuf::from(path)
    }
}

fn home_dir() -> String {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    home
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    PathBuf::from(home_dir()).join(".evidex").join("config.toml")
}
