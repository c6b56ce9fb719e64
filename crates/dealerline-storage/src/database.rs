// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection management: PRAGMAs, migrations, lifecycle.
//!
//! All statements run on tokio-rusqlite's single background thread, which
//! serialises writes. Do not open extra connections for writing.

use std::path::Path;

use dealerline_core::DealerlineError;
use tracing::debug;

/// Handle to the pipeline database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Opens (creating if needed) the database at `path` in WAL mode and
    /// applies pending migrations.
    pub async fn open(path: &str) -> Result<Self, DealerlineError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(DealerlineError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(DealerlineError::storage)?;
        Self::prepare(conn, true).await
    }

    /// An in-memory database, for tests.
    pub async fn open_in_memory() -> Result<Self, DealerlineError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(DealerlineError::storage)?;
        Self::prepare(conn, false).await
    }

    async fn prepare(conn: tokio_rusqlite::Connection, wal: bool) -> Result<Self, DealerlineError> {
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            if wal {
                let mode: String =
                    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
                debug!(%mode, "journal mode set");
            }
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| -> Result<Result<(), DealerlineError>, rusqlite::Error> {
            Ok(crate::migrations::run_migrations(conn))
        })
        .await
        .map_err(map_tr_err)??;

        debug!(wal, "database ready");
        Ok(Self { conn })
    }

    /// The underlying connection. Query modules call through this.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoints the WAL and closes the connection.
    pub async fn close(self) -> Result<(), DealerlineError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(map_tr_err)
    }
}

/// Maps a tokio-rusqlite error into a storage error.
pub fn map_tr_err<E>(err: tokio_rusqlite::Error<E>) -> DealerlineError
where
    tokio_rusqlite::Error<E>: std::fmt::Display,
{
    DealerlineError::Storage {
        source: err.to_string().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/dealerline.db");
        let db = Database::open(path.to_str().expect("utf8 path"))
            .await
            .expect("open");

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'refinery%' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .expect("list tables");

        assert_eq!(
            tables,
            vec!["conversations", "leads", "processed_deliveries", "turns"]
        );
        db.close().await.expect("close");
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("d.db");
        let path = path.to_str().expect("utf8 path");
        Database::open(path).await.expect("first open").close().await.expect("close");
        Database::open(path).await.expect("second open");
    }
}
