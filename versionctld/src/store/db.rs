use std::path::Path;
use anyhow::{Context, Result};
use rusqlite::{Connection, params, OptionalExtension};
use shared::types::Snapshot;

/// Durable home of the current snapshot: a single row, replaced wholesale.
pub struct SnapshotDb {
    conn: Connection,
}

impl SnapshotDb {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS snapshot (
                id          INTEGER PRIMARY KEY CHECK (id = 1),
                captured_at TEXT NOT NULL,
                digest      TEXT NOT NULL,
                body        TEXT NOT NULL
            );
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Replace the stored snapshot in a single transaction
    pub fn put(&mut self, snapshot: &Snapshot, digest: &str) -> Result<()> {
        let body = serde_json::to_string(snapshot)
            .context("Failed to serialize snapshot")?;

        let tx = self.conn.transaction()
            .context("Failed to begin snapshot transaction")?;
        tx.execute(
            r#"
            INSERT INTO snapshot (id, captured_at, digest, body)
            VALUES (1, ?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                captured_at = excluded.captured_at,
                digest = excluded.digest,
                body = excluded.body
            "#,
            params![snapshot.captured_at.to_rfc3339(), digest, &body],
        )
        .context("Failed to write snapshot")?;
        tx.commit().context("Failed to commit snapshot")?;

        Ok(())
    }

    /// Read the stored snapshot and the digest it was written with, if a
    /// cycle has ever completed
    pub fn load(&self) -> Result<Option<(Snapshot, String)>> {
        let stored = self
            .conn
            .query_row("SELECT body, digest FROM snapshot WHERE id = 1", [], |row| {
                let body: String = row.get(0)?;
                let digest: String = row.get(1)?;
                let snapshot = serde_json::from_str::<Snapshot>(&body).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok((snapshot, digest))
            })
            .optional()
            .context("Failed to load snapshot")?;

        Ok(stored)
    }

    /// Make every subsequent write fail
    #[cfg(test)]
    pub(crate) fn break_writes(&self) {
        self.conn
            .execute_batch(
                r#"
                CREATE TRIGGER reject_insert BEFORE INSERT ON snapshot
                BEGIN SELECT RAISE(ABORT, 'writes disabled'); END;
                CREATE TRIGGER reject_update BEFORE UPDATE ON snapshot
                BEGIN SELECT RAISE(ABORT, 'writes disabled'); END;
                "#,
            )
            .unwrap();
    }
}
