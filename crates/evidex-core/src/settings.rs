//! Persisted application state.
//!
//! Unlike [`crate::config::EvidexConfig`], which describes how the application
//! is set up, `AppSettings` records what the user is doing: the active
//! server, the active operation per server, and the last tags used. The store
//! is constructed explicitly with [`AppSettings::load`] and written back with
//! [`AppSettings::save`]; nothing is global.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EvidexError, Result};
use crate::types::{CurrentServer, Tag};

/// Current on-disk settings layout version.
pub const SETTINGS_VERSION: u32 = 2;

/// Server identifier given to the single server that existed before
/// multi-server support.
pub const LEGACY_SERVER_UUID: &str = "legacy-default-server";

/// Per-server operation selection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSetting {
    pub active_operation_slug: String,
    pub active_operation_name: String,
}

impl ServerSetting {
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            active_operation_slug: slug.into(),
            active_operation_name: name.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct SettingsData {
    version: u32,
    active_server: Option<String>,
    // v1 only: moved into `known_servers` by the v2 upgrade.
    operation_slug: Option<String>,
    operation_name: Option<String>,
    known_servers: BTreeMap<String, ServerSetting>,
    last_used_tags: Vec<Tag>,
}

/// The settings store, backed by a TOML file.
#[derive(Debug, Clone)]
pub struct AppSettings {
    path: PathBuf,
    data: SettingsData,
}

impl AppSettings {
    /// Load settings from `path`. A missing file yields empty settings at the
    /// current layout version, written there on the next [`save`](Self::save).
    /// A file without a version is a v1 layout.
    pub fn load(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| {
                EvidexError::Settings(format!("{}: {}", path.display(), e))
            })?
        } else {
            debug!(path = %path.display(), "No settings file, starting empty");
            SettingsData {
                version: SETTINGS_VERSION,
                ..SettingsData::default()
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    /// Write the settings back to the file they were loaded from.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(&self.data)
            .map_err(|e| EvidexError::Settings(e.to_string()))?;
        std::fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.data.version
    }

    /// Bring older settings layouts up to [`SETTINGS_VERSION`].
    ///
    /// Returns true if anything changed. The file is not rewritten; call
    /// [`save`](Self::save) afterwards.
    pub fn upgrade(&mut self) -> bool {
        if self.data.version >= SETTINGS_VERSION {
            return false;
        }
        if self.data.version < 2 {
            self.upgrade_to_v2();
        }
        self.data.version = SETTINGS_VERSION;
        info!(version = SETTINGS_VERSION, "Settings upgraded");
        true
    }

    fn upgrade_to_v2(&mut self) {
        self.data.active_server = Some(LEGACY_SERVER_UUID.to_string());
        let slug = self.data.operation_slug.take().unwrap_or_default();
        let name = self.data.operation_name.take().unwrap_or_default();
        if !slug.is_empty() && !name.is_empty() {
            self.data
                .known_servers
                .insert(LEGACY_SERVER_UUID.to_string(), ServerSetting::new(slug, name));
        }
    }

    // -------------------------------------------------------------------------
    // Active server
    // -------------------------------------------------------------------------

    pub fn server_uuid(&self) -> Option<&str> {
        self.data.active_server.as_deref().filter(|s| !s.is_empty())
    }

    pub fn set_server_uuid(&mut self, server_uuid: impl Into<String>) {
        self.data.active_server = Some(server_uuid.into());
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    pub fn known_servers(&self) -> &BTreeMap<String, ServerSetting> {
        &self.data.known_servers
    }

    /// Store `setting` for `server_uuid`, dropping the entry for
    /// `old_server_uuid` first when a server's identifier changed.
    pub fn update_server_setting(
        &mut self,
        server_uuid: &str,
        setting: ServerSetting,
        old_server_uuid: Option<&str>,
    ) {
        if let Some(old) = old_server_uuid {
            self.data.known_servers.remove(old);
        }
        self.data
            .known_servers
            .insert(server_uuid.to_string(), setting);
    }

    pub fn remove_server_setting(&mut self, server_uuid: &str) -> bool {
        self.data.known_servers.remove(server_uuid).is_some()
    }

    /// The operation selection for the active server, or an empty one.
    pub fn active_server_setting(&self) -> ServerSetting {
        self.server_uuid()
            .and_then(|uuid| self.data.known_servers.get(uuid))
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_operation_details(&mut self, slug: &str, name: &str) {
        let uuid = self.server_uuid().unwrap_or_default().to_string();
        self.update_server_setting(&uuid, ServerSetting::new(slug, name), None);
    }

    pub fn operation_slug(&self) -> String {
        self.active_server_setting().active_operation_slug
    }

    pub fn operation_name(&self) -> String {
        self.active_server_setting().active_operation_name
    }

    // -------------------------------------------------------------------------
    // Tags
    // -------------------------------------------------------------------------

    pub fn last_used_tags(&self) -> &[Tag] {
        &self.data.last_used_tags
    }

    pub fn set_last_used_tags(&mut self, tags: Vec<Tag>) {
        self.data.last_used_tags = tags;
    }
}

impl CurrentServer for AppSettings {
    fn current_server_uuid(&self) -> Option<String> {
        self.server_uuid().map(str::to_string)
    }
}
