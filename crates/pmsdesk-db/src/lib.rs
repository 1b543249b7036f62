// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use pmsdesk_app::{DraftStorage, FormDraft, FormKind};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

pub const APP_NAME: &str = "pmsdesk";
pub const DB_PATH_ENV: &str = "PMSDESK_DB_PATH";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS drafts (
  namespace  TEXT PRIMARY KEY,
  payload    TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[("drafts", &["namespace", "payload", "updated_at"])];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftSummary {
    pub kind: FormKind,
    pub field_count: usize,
    pub updated_at: OffsetDateTime,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        set_private_permissions(path)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("create schema")?;
        validate_schema(&self.conn)
    }

    /// Stored draft for `kind`. An unreadable row is logged and treated as
    /// absent; the next save replaces it.
    pub fn load_draft(&self, kind: FormKind) -> Result<Option<FormDraft>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM drafts WHERE namespace = ?",
                params![kind.draft_namespace()],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("load {} draft", kind.as_str()))?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        match serde_json::from_str::<FormDraft>(&payload) {
            Ok(draft) => Ok(Some(draft)),
            Err(error) => {
                warn!(form = kind.as_str(), "ignoring unreadable draft: {error}");
                Ok(None)
            }
        }
    }

    pub fn save_draft(&self, kind: FormKind, draft: &FormDraft) -> Result<()> {
        let payload = serde_json::to_string(draft)
            .with_context(|| format!("encode {} draft", kind.as_str()))?;
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO drafts (namespace, payload, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(namespace) DO UPDATE SET
                  payload = excluded.payload,
                  updated_at = excluded.updated_at
                ",
                params![kind.draft_namespace(), payload, now],
            )
            .with_context(|| format!("save {} draft", kind.as_str()))?;
        Ok(())
    }

    pub fn clear_draft(&self, kind: FormKind) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM drafts WHERE namespace = ?",
                params![kind.draft_namespace()],
            )
            .with_context(|| format!("clear {} draft", kind.as_str()))?;
        Ok(())
    }

    /// Saved drafts in namespace order. Rows from unknown namespaces are skipped.
    pub fn list_drafts(&self) -> Result<Vec<DraftSummary>> {
        let mut stmt = self
            .conn
            .prepare("SELECT namespace, payload, updated_at FROM drafts ORDER BY namespace ASC")
            .context("prepare draft list query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("query drafts")?;

        let mut summaries = Vec::new();
        for row in rows {
            let (namespace, payload, updated_at) = row.context("read draft row")?;
            let Some(kind) = namespace
                .strip_prefix("draft.")
                .and_then(FormKind::parse)
            else {
                continue;
            };
            let field_count = serde_json::from_str::<FormDraft>(&payload)
                .map(|draft| draft.fields.len())
                .unwrap_or(0);
            summaries.push(DraftSummary {
                kind,
                field_count,
                updated_at: OffsetDateTime::parse(&updated_at, &Rfc3339)
                    .with_context(|| format!("parse draft timestamp {updated_at:?}"))?,
            });
        }
        Ok(summaries)
    }
}

impl DraftStorage for Store {
    fn load(&self, kind: FormKind) -> Result<Option<FormDraft>> {
        self.load_draft(kind)
    }

    fn save(&mut self, kind: FormKind, draft: &FormDraft) -> Result<()> {
        self.save_draft(kind, draft)
    }

    fn clear(&mut self, kind: FormKind) -> Result<()> {
        self.clear_draft(kind)
    }
}

/// Handle onto a shared store, one per open form. The store stays on the
/// UI thread.
#[derive(Clone)]
pub struct DraftSlot {
    store: Rc<Store>,
}

impl DraftSlot {
    pub fn new(store: Rc<Store>) -> Self {
        Self { store }
    }
}

impl DraftStorage for DraftSlot {
    fn load(&self, kind: FormKind) -> Result<Option<FormDraft>> {
        self.store.load_draft(kind)
    }

    fn save(&mut self, kind: FormKind, draft: &FormDraft) -> Result<()> {
        self.store.save_draft(kind, draft)
    }

    fn clear(&mut self, kind: FormKind) -> Result<()> {
        self.store.clear_draft(kind)
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os(DB_PATH_ENV) {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set {DB_PATH_ENV} to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("pmsdesk.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }
    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }
    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }
    Ok(())
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        let columns = table_columns(conn, table)?;
        if columns.is_empty() {
            bail!("database is missing table `{table}`; point storage.db_path at a pmsdesk database");
        }
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();
        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing columns: {}; move the old database aside and restart",
                missing.join(", ")
            );
        }
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}

/// Drafts can hold contact details; keep the file owner-only.
fn set_private_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if !path.exists() {
            return Ok(());
        }
        let mut permissions = fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(path, permissions)
            .with_context(|| format!("set permissions on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
