//! Command handlers.
//!
//! Each handler works against an [`App`] and writes its report to `out`, so
//! the binary prints to stdout while tests capture into a buffer.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use evidex_core::filters::EvidenceFilters;
use evidex_core::settings::{AppSettings, LEGACY_SERVER_UUID};
use evidex_core::types::{resolve_server_uuid, Evidence, NewServer, Server, ServerSelector};
use evidex_core::{EvidexError, Result};
use evidex_storage::{Database, EvidenceRepository, ServerRepository};

use crate::cli::{AddServerArgs, Command, EvidenceCommand, OperationCommand, ServerCommand};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything a command needs.
pub struct App {
    pub db: Arc<Database>,
    pub servers: ServerRepository,
    pub evidence: EvidenceRepository,
    pub settings: AppSettings,
    /// Root under which relative evidence paths are stored, per operation.
    pub evidence_dir: PathBuf,
}

impl App {
    pub fn new(db: Arc<Database>, settings: AppSettings, evidence_dir: PathBuf) -> Self {
        Self {
            servers: ServerRepository::new(Arc::clone(&db)),
            evidence: EvidenceRepository::new(Arc::clone(&db)),
            db,
            settings,
            evidence_dir,
        }
    }

    /// Absolute paths are kept as given; relative ones land in the
    /// operation's folder of the evidence directory.
    pub fn evidence_path(&self, operation_slug: &str, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.evidence_dir.join(operation_slug).join(path)
        }
    }
}

pub fn run(app: &mut App, command: Command, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Migrate => migrate(app, out),
        Command::Server(cmd) => server(app, cmd, out),
        Command::Operation(cmd) => operation(app, cmd, out),
        Command::Evidence(cmd) => evidence(app, cmd, out),
    }
}

fn migrate(app: &App, out: &mut dyn Write) -> Result<()> {
    let report = app.db.migration_report();
    if report.is_noop() {
        writeln!(out, "Database is up to date")?;
        return Ok(());
    }
    for name in &report.applied {
        writeln!(out, "applied {}", name)?;
    }
    writeln!(
        out,
        "{} migrations, {} statements",
        report.applied.len(),
        report.statements_executed
    )?;
    Ok(())
}

// =============================================================================
// Servers
// =============================================================================

fn server(app: &mut App, command: ServerCommand, out: &mut dyn Write) -> Result<()> {
    match command {
        ServerCommand::List { all } => {
            let active = app.settings.server_uuid().map(str::to_string);
            for server in app.servers.list(all)? {
                writeln!(out, "{}", server_line(&server, active.as_deref()))?;
            }
        }
        ServerCommand::Add(args) => {
            let uuid = add_server(app, args)?;
            writeln!(out, "{}", uuid)?;
        }
        ServerCommand::Remove { uuid } => {
            require_server(app, &uuid)?;
            app.servers.delete(&uuid)?;
            writeln!(out, "removed {}", uuid)?;
        }
        ServerCommand::Restore { uuid } => {
            require_server(app, &uuid)?;
            app.servers.restore(&uuid)?;
            writeln!(out, "restored {}", uuid)?;
        }
        ServerCommand::Use { uuid } => {
            let server = require_server(app, &uuid)?;
            if server.is_deleted() {
                return Err(EvidexError::Validation(format!(
                    "server {} is deleted; restore it first",
                    uuid
                )));
            }
            app.settings.set_server_uuid(uuid.as_str());
            app.settings.save()?;
            info!(server_uuid = %uuid, "Active server changed");
            writeln!(out, "using {} ({})", server.server_name, uuid)?;
        }
    }
    Ok(())
}

fn add_server(app: &mut App, args: AddServerArgs) -> Result<String> {
    let uuid = args
        .uuid
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    app.servers.create(&NewServer {
        server_uuid: uuid.clone(),
        server_name: args.name,
        access_key: args.access_key,
        secret_key: args.secret_key,
        host_path: args.host,
    })?;

    // The first server registered becomes the active one.
    if app.settings.server_uuid().is_none() {
        app.settings.set_server_uuid(uuid.as_str());
        app.settings.save()?;
    }
    Ok(uuid)
}

/// Register the server that pre-server evidence was backfilled with, if the
/// settings point at it and it is not in the database yet.
pub fn register_legacy_server(app: &App) -> Result<bool> {
    if app.settings.server_uuid() != Some(LEGACY_SERVER_UUID)
        || app.servers.exists(LEGACY_SERVER_UUID)?
    {
        return Ok(false);
    }
    app.servers.create(&NewServer {
        server_uuid: LEGACY_SERVER_UUID.to_string(),
        server_name: "Default Server".to_string(),
        ..NewServer::default()
    })?;
    info!("Registered legacy default server");
    Ok(true)
}

fn require_server(app: &App, uuid: &str) -> Result<Server> {
    app.servers
        .get(uuid)?
        .ok_or_else(|| EvidexError::Validation(format!("no server with uuid {}", uuid)))
}

fn server_line(server: &Server, active: Option<&str>) -> String {
    let marker = if active == Some(server.server_uuid.as_str()) {
        "*"
    } else {
        " "
    };
    let state = if server.is_deleted() { " (deleted)" } else { "" };
    format!(
        "{} {}  {}  {}{}",
        marker, server.server_uuid, server.server_name, server.host_path, state
    )
}

// =============================================================================
// Operations
// =============================================================================

fn operation(app: &mut App, command: OperationCommand, out: &mut dyn Write) -> Result<()> {
    match command {
        OperationCommand::Show => {
            let slug = app.settings.operation_slug();
            if slug.is_empty() {
                writeln!(out, "No active operation")?;
            } else {
                writeln!(out, "{} ({})", slug, app.settings.operation_name())?;
            }
        }
        OperationCommand::Use { slug, name } => {
            if app.settings.server_uuid().is_none() {
                return Err(EvidexError::Validation(
                    "no active server; run `server use` first".to_string(),
                ));
            }
            let name = name.unwrap_or_else(|| slug.clone());
            app.settings.set_operation_details(&slug, &name);
            app.settings.save()?;
            writeln!(out, "using operation {}", slug)?;
        }
    }
    Ok(())
}

// =============================================================================
// Evidence
// =============================================================================

fn evidence(app: &mut App, command: EvidenceCommand, out: &mut dyn Write) -> Result<()> {
    match command {
        EvidenceCommand::Add {
            path,
            op,
            content_type,
            server,
            description,
        } => {
            let op = op.unwrap_or_else(|| app.settings.operation_slug());
            if op.is_empty() {
                return Err(EvidexError::Validation(
                    "no operation given and no active operation set".to_string(),
                ));
            }
            let server_uuid =
                resolve_server_uuid(&ServerSelector::from(server), &app.settings);
            if server_uuid.is_empty() {
                warn!("Recording evidence without a server");
            }
            let path = app.evidence_path(&op, &path);
            let id = app.evidence.create(
                &path.to_string_lossy(),
                &op,
                &server_uuid,
                &content_type,
            )?;
            if let Some(description) = description {
                app.evidence.update_description(id, &description)?;
            }
            writeln!(out, "{}", id)?;
        }
        EvidenceCommand::List { filter, json } => {
            let filters: EvidenceFilters = filter.parse()?;
            let found = app.evidence.list(&filters)?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&found)?)?;
            } else {
                for item in &found {
                    writeln!(out, "{}", evidence_line(item))?;
                }
            }
        }
        EvidenceCommand::Show { id, json } => {
            let item = require_evidence(app, id)?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&item)?)?;
            } else {
                write_evidence(&item, out)?;
            }
        }
        EvidenceCommand::Submit { id } => {
            require_evidence(app, id)?;
            app.evidence.mark_submitted(id)?;
            writeln!(out, "submitted {}", id)?;
        }
        EvidenceCommand::Fail { id, message } => {
            require_evidence(app, id)?;
            app.evidence.record_error(id, &message)?;
            if message.is_empty() {
                writeln!(out, "cleared error on {}", id)?;
            } else {
                writeln!(out, "recorded error on {}", id)?;
            }
        }
        EvidenceCommand::Delete { id } => {
            require_evidence(app, id)?;
            app.evidence.delete(id)?;
            writeln!(out, "deleted {}", id)?;
        }
        EvidenceCommand::Tag { id, tags } => {
            require_evidence(app, id)?;
            let sync = app.evidence.set_tags(id, &tags)?;
            app.settings.set_last_used_tags(tags);
            app.settings.save()?;
            writeln!(out, "{} removed, {} added", sync.removed, sync.inserted)?;
        }
    }
    Ok(())
}

fn require_evidence(app: &App, id: i64) -> Result<Evidence> {
    app.evidence
        .get(id)?
        .ok_or_else(|| EvidexError::Validation(format!("no evidence with id {}", id)))
}

fn evidence_line(item: &Evidence) -> String {
    let state = if item.has_error() {
        "error"
    } else if item.is_submitted() {
        "submitted"
    } else {
        "pending"
    };
    format!(
        "{:>5}  {}  {:<9}  {:<10}  {}  {}",
        item.id,
        item.recorded_date.format(TIME_FORMAT),
        state,
        item.content_type,
        item.operation_slug,
        item.path
    )
}

fn write_evidence(item: &Evidence, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "id:          {}", item.id)?;
    writeln!(out, "path:        {}", item.path)?;
    writeln!(out, "operation:   {}", item.operation_slug)?;
    writeln!(out, "server:      {}", item.server_uuid)?;
    writeln!(out, "type:        {}", item.content_type)?;
    writeln!(out, "description: {}", item.description)?;
    writeln!(out, "recorded:    {}", item.recorded_date.format(TIME_FORMAT))?;
    match item.upload_date {
        Some(at) => writeln!(out, "uploaded:    {}", at.format(TIME_FORMAT))?,
        None => writeln!(out, "uploaded:    no")?,
    }
    if item.has_error() {
        writeln!(out, "error:       {}", item.error_text)?;
    }
    let tags: Vec<String> = item
        .tags
        .iter()
        .map(|t| format!("{}:{}", t.server_tag_id, t.tag_name))
        .collect();
    writeln!(out, "tags:        {}", tags.join(", "))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidex_core::types::Tag;

    fn make_app(dir: &tempfile::TempDir) -> App {
        let db = Arc::new(Database::in_memory().unwrap());
        let settings = AppSettings::load(&dir.path().join("settings.toml")).unwrap();
        App::new(db, settings, dir.path().join("evidence"))
    }

    fn run_ok(app: &mut App, command: Command) -> String {
        let mut out = Vec::new();
        run(app, command, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn add_server_cmd(uuid: &str) -> Command {
        Command::Server(ServerCommand::Add(AddServerArgs {
            name: format!("Server {}", uuid),
            host: "https://evidence.example".into(),
            uuid: Some(uuid.into()),
            access_key: String::new(),
            secret_key: String::new(),
        }))
    }

    #[test]
    fn test_first_server_becomes_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = make_app(&dir);

        assert_eq!(run_ok(&mut app, add_server_cmd("srv-1")).trim(), "srv-1");
        run_ok(&mut app, add_server_cmd("srv-2"));
        assert_eq!(app.settings.server_uuid(), Some("srv-1"));

        let listed = run_ok(&mut app, Command::Server(ServerCommand::List { all: false }));
        assert!(listed.lines().next().unwrap().starts_with("* srv-1"));

        // The choice is persisted.
        let reloaded = AppSettings::load(&dir.path().join("settings.toml")).unwrap();
        assert_eq!(reloaded.server_uuid(), Some("srv-1"));
    }

    #[test]
    fn test_register_legacy_server() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = make_app(&dir);
        assert!(!register_legacy_server(&app).unwrap());

        app.settings.set_server_uuid(LEGACY_SERVER_UUID);
        assert!(register_legacy_server(&app).unwrap());
        assert!(!register_legacy_server(&app).unwrap());
        assert_eq!(
            app.servers.server_name(LEGACY_SERVER_UUID).unwrap().as_deref(),
            Some("Default Server")
        );
    }

    #[test]
    fn test_generated_server_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = make_app(&dir);
        let mut cmd = add_server_cmd("");
        if let Command::Server(ServerCommand::Add(ref mut args)) = cmd {
            args.uuid = None;
        }
        let uuid = run_ok(&mut app, cmd).trim().to_string();
        assert_eq!(uuid.len(), 36);
        assert!(app.servers.exists(&uuid).unwrap());
    }

    #[test]
    fn test_cannot_use_deleted_server() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = make_app(&dir);
        run_ok(&mut app, add_server_cmd("srv-1"));
        run_ok(&mut app, add_server_cmd("srv-2"));
        run_ok(
            &mut app,
            Command::Server(ServerCommand::Remove { uuid: "srv-2".into() }),
        );

        let mut out = Vec::new();
        let err = run(
            &mut app,
            Command::Server(ServerCommand::Use { uuid: "srv-2".into() }),
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, EvidexError::Validation(_)));

        run_ok(
            &mut app,
            Command::Server(ServerCommand::Restore { uuid: "srv-2".into() }),
        );
        run_ok(&mut app, Command::Server(ServerCommand::Use { uuid: "srv-2".into() }));
        assert_eq!(app.settings.server_uuid(), Some("srv-2"));
    }

    #[test]
    fn test_evidence_uses_active_server_and_operation() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = make_app(&dir);
        run_ok(&mut app, add_server_cmd("srv-1"));
        run_ok(
            &mut app,
            Command::Operation(OperationCommand::Use {
                slug: "acme".into(),
                name: Some("ACME Corp".into()),
            }),
        );

        let id: i64 = run_ok(
            &mut app,
            Command::Evidence(EvidenceCommand::Add {
                path: "/tmp/shot.png".into(),
                op: None,
                content_type: "image".into(),
                server: None,
                description: Some("login".into()),
            }),
        )
        .trim()
        .parse()
        .unwrap();

        let stored = app.evidence.get(id).unwrap().unwrap();
        assert_eq!(stored.server_uuid, "srv-1");
        assert_eq!(stored.operation_slug, "acme");
        assert_eq!(stored.description, "login");
    }

    #[test]
    fn test_relative_evidence_path_lands_in_operation_folder() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = make_app(&dir);
        let id: i64 = run_ok(
            &mut app,
            Command::Evidence(EvidenceCommand::Add {
                path: "shot.png".into(),
                op: Some("acme".into()),
                content_type: "image".into(),
                server: Some("srv-9".into()),
                description: None,
            }),
        )
        .trim()
        .parse()
        .unwrap();

        let stored = app.evidence.get(id).unwrap().unwrap();
        let expected = dir.path().join("evidence").join("acme").join("shot.png");
        assert_eq!(stored.path, expected.to_string_lossy());
        assert_eq!(stored.server_uuid, "srv-9");
    }

    #[test]
    fn test_add_evidence_without_operation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = make_app(&dir);
        let mut out = Vec::new();
        let err = run(
            &mut app,
            Command::Evidence(EvidenceCommand::Add {
                path: "/tmp/a".into(),
                op: None,
                content_type: "image".into(),
                server: None,
                description: None,
            }),
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, EvidexError::Validation(_)));
    }

    #[test]
    fn test_tag_submit_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = make_app(&dir);
        let id = app.evidence.create("/tmp/a", "op", "srv", "image").unwrap();
        let other = app.evidence.create("/tmp/b", "op", "srv", "image").unwrap();

        let summary = run_ok(
            &mut app,
            Command::Evidence(EvidenceCommand::Tag {
                id,
                tags: vec![Tag::from_server(1, "web")],
            }),
        );
        assert_eq!(summary.trim(), "0 removed, 1 added");
        assert_eq!(app.settings.last_used_tags().len(), 1);

        run_ok(&mut app, Command::Evidence(EvidenceCommand::Submit { id }));
        let failed = run_ok(
            &mut app,
            Command::Evidence(EvidenceCommand::Fail {
                id: other,
                message: "timeout".into(),
            }),
        );
        assert_eq!(failed.trim(), format!("recorded error on {}", other));

        let listed = run_ok(
            &mut app,
            Command::Evidence(EvidenceCommand::List {
                filter: "submitted:yes".into(),
                json: true,
            }),
        );
        let parsed: serde_json::Value = serde_json::from_str(&listed).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["id"], id);

        let errored = run_ok(
            &mut app,
            Command::Evidence(EvidenceCommand::List {
                filter: "err:yes".into(),
                json: false,
            }),
        );
        assert_eq!(errored.lines().count(), 1);
        assert!(errored.contains("error"));

        let shown = run_ok(
            &mut app,
            Command::Evidence(EvidenceCommand::Show { id, json: false }),
        );
        assert!(shown.contains("tags:        1:web"));
    }

    #[test]
    fn test_missing_evidence_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = make_app(&dir);
        let mut out = Vec::new();
        let err = run(
            &mut app,
            Command::Evidence(EvidenceCommand::Delete { id: 99 }),
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, EvidexError::Validation(_)));
    }

    #[test]
    fn test_bad_filter_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = make_app(&dir);
        let mut out = Vec::new();
        let err = run(
            &mut app,
            Command::Evidence(EvidenceCommand::List {
                filter: "colour:blue".into(),
                json: false,
            }),
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, EvidexError::Validation(_)));
    }

    #[test]
    fn test_migrate_reports_applied_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = make_app(&dir);
        let out = run_ok(&mut app, Command::Migrate);
        assert!(out.contains("5 migrations"));
    }
}
