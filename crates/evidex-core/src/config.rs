use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EvidexError, Result};

/// Top-level configuration for the Evidex application.
///
/// Loaded from `~/.evidex/config.toml` by default. This describes how the
/// application is laid out on disk; runtime state such as the active server
/// lives in [`crate::settings::AppSettings`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidexConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
}

impl EvidexConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EvidexConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Load configuration, writing a default file first when none exists.
    ///
    /// Writing the default file is best effort: a failure is logged and the
    /// defaults are still returned. An existing but unreadable or invalid
    /// file is an error.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        if let Err(e) = config.save(path) {
            warn!(path = %path.display(), error = %e, "Could not write default config");
        }
        Ok(config)
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| EvidexError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the database and settings file.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.evidex/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file name, relative to the data directory.
    pub db_file: String,
    /// Load migration scripts from this directory instead of the ones
    /// compiled into the binary.
    pub migrations_dir: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_file: "evidence.sqlite".to_string(),
            migrations_dir: None,
        }
    }
}

/// Where captured evidence files are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    pub repo_dir: String,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            repo_dir: "~/.evidex/evidence".to_string(),
        }
    }
}
