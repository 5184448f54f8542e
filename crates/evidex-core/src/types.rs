use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Servers
// =============================================================================

/// A remote evidence server the user has registered locally.
///
/// Servers are never hard-deleted; `deleted_at` marks a soft delete and
/// clearing it restores the server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub server_uuid: String,
    pub server_name: String,
    pub access_key: String,
    pub secret_key: String,
    pub host_path: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Server {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Fields required to register a new server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewServer {
    pub server_uuid: String,
    pub server_name: String,
    pub access_key: String,
    pub secret_key: String,
    pub host_path: String,
}

/// Which server an operation applies to.
///
/// `Current` defers to whatever the settings store reports as the active
/// server; see [`resolve_server_uuid`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ServerSelector {
    #[default]
    Current,
    Uuid(String),
}

impl From<Option<String>> for ServerSelector {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(uuid) if !uuid.is_empty() => ServerSelector::Uuid(uuid),
            _ => ServerSelector::Current,
        }
    }
}

/// Source of the "current server" identifier, typically the settings store.
pub trait CurrentServer {
    fn current_server_uuid(&self) -> Option<String>;
}

/// Resolve a selector into a concrete server identifier.
///
/// An explicit, non-empty uuid always wins. Otherwise the current server
/// reported by `current` is used, and an empty string is returned when no
/// server is active (lookups against it simply find nothing).
pub fn resolve_server_uuid(selector: &ServerSelector, current: &dyn CurrentServer) -> String {
    match selector {
        ServerSelector::Uuid(uuid) if !uuid.is_empty() => uuid.clone(),
        _ => current.current_server_uuid().unwrap_or_default(),
    }
}

// =============================================================================
// Evidence
// =============================================================================

/// A tag attached to a piece of evidence.
///
/// `id` is the local row identifier; `server_tag_id` is the identity the
/// remote server assigned to the tag.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub server_tag_id: i64,
    pub tag_name: String,
}

impl Tag {
    pub fn new(id: i64, server_tag_id: i64, tag_name: impl Into<String>) -> Self {
        Self {
            id,
            server_tag_id,
            tag_name: tag_name.into(),
        }
    }

    /// A tag known only by its server identity, not yet stored locally.
    pub fn from_server(server_tag_id: i64, tag_name: impl Into<String>) -> Self {
        Self::new(0, server_tag_id, tag_name)
    }
}

/// A captured piece of evidence (screenshot, codeblock, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: i64,
    pub path: String,
    pub operation_slug: String,
    pub server_uuid: String,
    pub content_type: String,
    pub description: String,
    /// Empty unless a capture or upload failure was recorded.
    pub error_text: String,
    pub recorded_date: DateTime<Utc>,
    /// Absent until the evidence is marked submitted.
    pub upload_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Evidence {
    pub fn is_submitted(&self) -> bool {
        self.upload_date.is_some()
    }

    pub fn has_error(&self) -> bool {
        !self.error_text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedServer(Option<&'static str>);

    impl CurrentServer for FixedServer {
        fn current_server_uuid(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    #[test]
    fn test_explicit_uuid_wins() {
        let selector = ServerSelector::Uuid("abc".into());
        assert_eq!(resolve_server_uuid(&selector, &FixedServer(Some("zzz"))), "abc");
    }

    #[test]
    fn test_current_server_fallback() {
        assert_eq!(
            resolve_server_uuid(&ServerSelector::Current, &FixedServer(Some("zzz"))),
            "zzz"
        );
        assert_eq!(resolve_server_uuid(&ServerSelector::Current, &FixedServer(None)), "");
    }

    #[test]
    fn test_empty_uuid_falls_back_to_current() {
        let selector = ServerSelector::Uuid(String::new());
        assert_eq!(resolve_server_uuid(&selector, &FixedServer(Some("zzz"))), "zzz");
        assert_eq!(ServerSelector::from(Some(String::new())), ServerSelector::Current);
        assert_eq!(
            ServerSelector::from(Some("x".to_string())),
            ServerSelector::Uuid("x".into())
        );
    }

    #[test]
    fn test_server_soft_delete_flag() {
        let mut server = Server::default();
        assert!(!server.is_deleted());
        server.deleted_at = Some(Utc::now());
        assert!(server.is_deleted());
    }

    #[test]
    fn test_evidence_serialization() {
        let evidence = Evidence {
            id: 7,
            path: "/tmp/shot.png".into(),
            operation_slug: "op".into(),
            server_uuid: "srv".into(),
            content_type: "image".into(),
            description: String::new(),
            error_text: String::new(),
            recorded_date: Utc::now(),
            upload_date: None,
            tags: vec![Tag::new(1, 10, "web")],
        };
        let json = serde_json::to_string(&evidence).unwrap();
        let back: Evidence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, evidence);
        assert!(!back.is_submitted());
        assert!(!back.has_error());
    }
}
