//! 记忆修订历史，存储于 SQLite

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::engine::types::{EventKind, HistoryRecord};
use crate::error::{AppError, Result};

/// One revision to append.
#[derive(Debug, Clone)]
pub struct HistoryEntry<'a> {
    pub memory_id: &'a str,
    pub old_memory: Option<&'a str>,
    pub new_memory: Option<&'a str>,
    pub event: EventKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

/// History store backed by a dedicated SQLite database.
#[derive(Clone)]
pub struct HistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl HistoryStore {
    /// Open (or create) the history database. `:memory:` keeps it in process.
    pub async fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let conn = Connection::open(path)?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous  = NORMAL;",
            )?;
            conn
        };

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS history (
                id          TEXT PRIMARY KEY,
                memory_id   TEXT NOT NULL,
                old_memory  TEXT,
                new_memory  TEXT,
                event       TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT,
                is_deleted  INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_history_memory ON history(memory_id);",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn append(&self, entry: HistoryEntry<'_>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO history
             (id, memory_id, old_memory, new_memory, event, created_at, updated_at, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                entry.memory_id,
                entry.old_memory,
                entry.new_memory,
                entry.event.as_str(),
                entry.created_at.to_rfc3339(),
                entry.updated_at.map(|t| t.to_rfc3339()),
                entry.is_deleted,
            ],
        )?;
        Ok(id)
    }

    /// Revisions of one memory, oldest first.
    pub async fn list(&self, memory_id: &str) -> Result<Vec<HistoryRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, memory_id, old_memory, new_memory, event, created_at, updated_at, is_deleted
             FROM history WHERE memory_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![memory_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, bool>(7)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, memory_id, old_memory, new_memory, event, created_at, updated_at, is_deleted) =
                row?;
            records.push(HistoryRecord {
                id,
                memory_id,
                old_memory,
                new_memory,
                event: EventKind::parse(&event)
                    .ok_or_else(|| AppError::History(format!("unknown event: {}", event)))?,
                created_at: parse_timestamp(&created_at)?,
                updated_at: updated_at.as_deref().map(parse_timestamp).transpose()?,
                is_deleted,
            });
        }
        Ok(records)
    }

    pub async fn reset(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM history", [])?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::History(format!("invalid timestamp {}: {}", raw, e)))
}
