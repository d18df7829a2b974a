//! SQLite-backed evidence store.
//!
//! One database file shared by detectord (writes photos, advances the
//! alert sequence) and notifierd (reads photos, records dead letters).
//! WAL mode plus a busy timeout keeps the two processes out of each
//! other's way; every write here is a single statement, so there are no
//! multi-statement races to guard.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Catalog entry for one stored photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRecord {
    pub name: String,
    pub stored_at: u64,
}

/// One alert that exhausted delivery, kept for operator review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub id: i64,
    pub recorded_at: u64,
    pub reason: String,
    pub attempts: u32,
}

pub struct PhotoStore {
    conn: Connection,
}

impl PhotoStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open store at {}", path.display()))?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory store")?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA busy_timeout=5000;
                 CREATE TABLE IF NOT EXISTS photos (
                     name      TEXT PRIMARY KEY,
                     stored_at INTEGER NOT NULL,
                     bytes     BLOB NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS alert_seq (
                     id    INTEGER PRIMARY KEY CHECK (id = 0),
                     value INTEGER NOT NULL
                 );
                 INSERT OR IGNORE INTO alert_seq (id, value) VALUES (0, 0);
                 CREATE TABLE IF NOT EXISTS dead_letters (
                     id          INTEGER PRIMARY KEY AUTOINCREMENT,
                     recorded_at INTEGER NOT NULL,
                     payload     BLOB NOT NULL,
                     reason      TEXT NOT NULL,
                     attempts    INTEGER NOT NULL
                 );",
            )
            .context("failed to apply store schema")?;
        Ok(())
    }

    /// Advance and return the alert sequence. Increment and read are one
    /// statement, so concurrent consumers never see the same value.
    pub fn next_photo_seq(&self) -> Result<u64> {
        let value = self
            .conn
            .query_row(
                "UPDATE alert_seq SET value = value + 1 WHERE id = 0 RETURNING value",
                [],
                |row| row.get::<_, i64>(0),
            )
            .context("failed to advance alert sequence")?;
        Ok(value as u64)
    }

    /// Idempotent by name: a redelivered detection overwrites its own
    /// photo instead of failing.
    pub fn store_photo(&self, name: &str, stored_at: u64, bytes: &[u8]) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO photos (name, stored_at, bytes) VALUES (?1, ?2, ?3)",
                params![name, stored_at as i64, bytes],
            )
            .with_context(|| format!("failed to store photo '{name}'"))?;
        Ok(())
    }

    pub fn load_photo(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let bytes = self
            .conn
            .query_row(
                "SELECT bytes FROM photos WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to load photo '{name}'"))?;
        Ok(bytes)
    }

    pub fn photo_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))
            .context("failed to count photos")?;
        Ok(count as u64)
    }

    /// Stored photos, oldest first.
    pub fn list_photos(&self) -> Result<Vec<PhotoRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, stored_at FROM photos ORDER BY stored_at, name")?;
        let rows = stmt.query_map([], |row| {
            Ok(PhotoRecord {
                name: row.get(0)?,
                stored_at: row.get::<_, i64>(1)? as u64,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("failed to read photo catalog")?);
        }
        Ok(records)
    }

    pub fn record_dead_letter(
        &self,
        recorded_at: u64,
        payload: &[u8],
        reason: &str,
        attempts: u32,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO dead_letters (recorded_at, payload, reason, attempts)
                 VALUES (?1, ?2, ?3, ?4)",
                params![recorded_at as i64, payload, reason, attempts],
            )
            .context("failed to record dead letter")?;
        Ok(())
    }

    pub fn dead_letter_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM dead_letters", [], |row| row.get(0))
            .context("failed to count dead letters")?;
        Ok(count as u64)
    }

    /// Most recent dead letters, newest first.
    pub fn list_dead_letters(&self, limit: u32) -> Result<Vec<DeadLetter>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, recorded_at, reason, attempts FROM dead_letters
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(DeadLetter {
                id: row.get(0)?,
                recorded_at: row.get::<_, i64>(1)? as u64,
                reason: row.get(2)?,
                attempts: row.get(3)?,
            })
        })?;
        let mut letters = Vec::new();
        for row in rows {
            letters.push(row.context("failed to read dead letters")?);
        }
        Ok(letters)
    }
}
