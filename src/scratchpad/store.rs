//! External durable store for scratchpad entries that opt into persistence
//! (artifact/decision/strategy types, per config flags).
//!
//! A thin `rusqlite` wrapper behind a `Mutex<Connection>`, mirroring the
//! WAL + busy_timeout + foreign_keys PRAGMA discipline used elsewhere in
//! the crate for on-disk SQLite state.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

pub struct StoreRow {
    pub key: String,
    pub entry_type: String,
    pub raw: Vec<u8>,
    pub summary: String,
    pub metadata: String,
    pub created_by: String,
    pub created_at: String,
}

pub struct Store {
    conn: Mutex<Connection>,
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA busy_timeout=3000;
         PRAGMA foreign_keys=ON;",
    )
    .context("failed to set scratchpad store PRAGMAs")
}

impl Store {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create scratchpad store directory: {}",
                    parent.display()
                )
            })?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open scratchpad store at {}", db_path.display()))?;
        apply_pragmas(&conn)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scratchpad_entries (
                key TEXT PRIMARY KEY,
                entry_type TEXT NOT NULL,
                raw BLOB NOT NULL,
                summary TEXT NOT NULL,
                metadata TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )
        .context("failed to create scratchpad_entries table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory store")?;
        apply_pragmas(&conn)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scratchpad_entries (
                key TEXT PRIMARY KEY,
                entry_type TEXT NOT NULL,
                raw BLOB NOT NULL,
                summary TEXT NOT NULL,
                metadata TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn upsert(&self, row: &StoreRow) -> Result<()> {
        let conn = self.conn.lock().expect("scratchpad store mutex poisoned");
        conn.execute(
            "INSERT INTO scratchpad_entries (key, entry_type, raw, summary, metadata, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(key) DO UPDATE SET
                entry_type = excluded.entry_type,
                raw = excluded.raw,
                summary = excluded.summary,
                metadata = excluded.metadata,
                created_by = excluded.created_by,
                created_at = excluded.created_at",
            params![
                row.key,
                row.entry_type,
                row.raw,
                row.summary,
                row.metadata,
                row.created_by,
                row.created_at
            ],
        )
        .context("failed to upsert scratchpad entry")?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<StoreRow>> {
        let conn = self.conn.lock().expect("scratchpad store mutex poisoned");
        conn.query_row(
            "SELECT key, entry_type, raw, summary, metadata, created_by, created_at
             FROM scratchpad_entries WHERE key = ?1",
            params![key],
            |row| {
                Ok(StoreRow {
                    key: row.get(0)?,
                    entry_type: row.get(1)?,
                    raw: row.get(2)?,
                    summary: row.get(3)?,
                    metadata: row.get(4)?,
                    created_by: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        )
        .optional()
        .context("failed to query scratchpad entry")
    }
}

#[cfg(test)]
mod tests;
