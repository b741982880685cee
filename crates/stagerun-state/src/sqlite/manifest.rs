use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use stagerun_types::ids::ManifestKey;
use stagerun_types::state::{ManifestRecord, StageStatus};
use stagerun_types::status::ManifestStatus;

use super::{in_memory_with_schema, now_sqlite, open_with_schema, sqlite_to_iso8601};
use crate::error::{self, StateError};
use crate::manifest::ManifestTable;

/// Idempotent DDL for manifest control tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS manifest_records (
    manifest_key TEXT PRIMARY KEY,
    dataset TEXT NOT NULL,
    datafile TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS manifest_stage_status (
    manifest_key TEXT NOT NULL REFERENCES manifest_records(manifest_key),
    stage TEXT NOT NULL,
    status TEXT NOT NULL,
    payload TEXT,
    started_at TEXT,
    ended_at TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (manifest_key, stage)
);
";

/// Upsert of one stage row. `PROCESSING`/`STARTED` reopen the stage, so a
/// stale `ended_at` from an earlier attempt is cleared.
const UPSERT_STAGE: &str = r"
INSERT INTO manifest_stage_status
    (manifest_key, stage, status, payload, started_at, ended_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(manifest_key, stage) DO UPDATE SET
    status = excluded.status,
    payload = COALESCE(excluded.payload, manifest_stage_status.payload),
    started_at = COALESCE(excluded.started_at, manifest_stage_status.started_at),
    ended_at = CASE
        WHEN excluded.status IN ('STARTED', 'PROCESSING') THEN NULL
        ELSE COALESCE(excluded.ended_at, manifest_stage_status.ended_at)
    END,
    updated_at = excluded.updated_at
";

/// `SQLite`-backed manifest control table.
pub struct SqliteManifestTable {
    conn: Mutex<Connection>,
}

impl SqliteManifestTable {
    /// Open or create a manifest database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created, or a
    /// `SQLite` error if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        Ok(Self {
            conn: Mutex::new(open_with_schema(path, CREATE_TABLES)?),
        })
    }

    /// Create an in-memory manifest table (for testing).
    ///
    /// # Errors
    ///
    /// Returns a `SQLite` error if the database can't be initialized.
    pub fn in_memory() -> error::Result<Self> {
        Ok(Self {
            conn: Mutex::new(in_memory_with_schema(CREATE_TABLES)?),
        })
    }

    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    fn load_stages(conn: &Connection, key: &ManifestKey) -> error::Result<Vec<StageStatus>> {
        let mut stmt = conn
            .prepare(
                "SELECT stage, status, payload, started_at, ended_at, updated_at \
                 FROM manifest_stage_status WHERE manifest_key = ?1 ORDER BY stage",
            )
            .map_err(|e| StateError::context("get: prepare stages", e))?;
        let rows = stmt
            .query_map([key.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| StateError::context("get: query stages", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StateError::context("get: read stage row", e))?;

        rows.into_iter()
            .map(|(stage, status, payload, started_at, ended_at, updated_at)| {
                let status = status.parse::<ManifestStatus>().map_err(|e| {
                    StateError::Corrupt(format!("manifest_stage_status.status: {e}"))
                })?;
                Ok(StageStatus {
                    stage,
                    status,
                    payload,
                    started_at: started_at.as_deref().map(sqlite_to_iso8601),
                    ended_at: ended_at.as_deref().map(sqlite_to_iso8601),
                    updated_at: sqlite_to_iso8601(&updated_at),
                })
            })
            .collect()
    }
}

impl ManifestTable for SqliteManifestTable {
    fn register(&self, key: &ManifestKey, dataset: &str, datafile: &str) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO manifest_records (manifest_key, dataset, datafile, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![key.as_str(), dataset, datafile, now_sqlite()],
            )
            .map_err(|e| StateError::context("register", e))?;
        if inserted == 0 {
            return Err(StateError::ManifestExists(key.clone()));
        }
        Ok(())
    }

    fn update_stage_status(
        &self,
        key: &ManifestKey,
        stage: &str,
        status: ManifestStatus,
        payload: Option<&str>,
    ) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::context("update_stage_status: begin tx", e))?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM manifest_records WHERE manifest_key = ?1",
                [key.as_str()],
                |_| Ok(()),
            )
            .optional()
            .map_err(|e| StateError::context("update_stage_status: lookup", e))?
            .is_some();
        if !exists {
            return Err(StateError::ManifestNotFound(key.clone()));
        }

        let now = now_sqlite();
        let started_at = (status == ManifestStatus::Processing).then(|| now.clone());
        let ended_at = status.ends_stage().then(|| now.clone());
        tx.execute(
            UPSERT_STAGE,
            rusqlite::params![
                key.as_str(),
                stage,
                status.as_str(),
                payload,
                started_at,
                ended_at,
                now,
            ],
        )
        .map_err(|e| StateError::context("update_stage_status: upsert", e))?;
        tx.commit()
            .map_err(|e| StateError::context("update_stage_status: commit", e))?;

        tracing::debug!(
            manifest_key = key.as_str(),
            stage,
            status = %status,
            "Manifest stage status written"
        );
        Ok(())
    }

    fn get(&self, key: &ManifestKey) -> error::Result<Option<ManifestRecord>> {
        let conn = self.lock_conn()?;
        let head = conn
            .query_row(
                "SELECT dataset, datafile, created_at FROM manifest_records WHERE manifest_key = ?1",
                [key.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StateError::context("get", e))?;

        let Some((dataset, datafile, created_at)) = head else {
            return Ok(None);
        };
        let stages = Self::load_stages(&conn, key)?;
        Ok(Some(ManifestRecord {
            key: key.clone(),
            dataset,
            datafile,
            created_at: sqlite_to_iso8601(&created_at),
            stages,
        }))
    }
}
