use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use stagerun_types::ids::{EnvName, RunId};
use stagerun_types::state::{RunEvent, RunRecord};
use stagerun_types::status::RunStatus;

use super::{in_memory_with_schema, now_sqlite, open_with_schema, sqlite_to_iso8601};
use crate::error::{self, StateError};
use crate::ledger::ExecutionLedger;

/// Idempotent DDL for ledger tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS pipeline_runs (
    id TEXT PRIMARY KEY,
    pipeline TEXT NOT NULL,
    env TEXT NOT NULL,
    status TEXT NOT NULL,
    last_message TEXT,
    component TEXT,
    issue_comment TEXT,
    started_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    ended_at TEXT
);

CREATE TABLE IF NOT EXISTS pipeline_run_events (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL REFERENCES pipeline_runs(id),
    status TEXT NOT NULL,
    message TEXT,
    component TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_run_events_run ON pipeline_run_events (run_id, seq);
";

/// `SQLite`-backed execution ledger.
///
/// Create with [`SqliteLedger::open`] for file-backed persistence or
/// [`SqliteLedger::in_memory`] for tests.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

/// Raw `pipeline_runs` row before status parsing.
struct RunRow {
    id: String,
    pipeline: String,
    env: String,
    status: String,
    last_message: Option<String>,
    component: Option<String>,
    issue_comment: Option<String>,
    started_at: String,
    updated_at: String,
    ended_at: Option<String>,
}

impl RunRow {
    fn into_record(self) -> error::Result<RunRecord> {
        Ok(RunRecord {
            id: RunId::new(self.id),
            pipeline: self.pipeline,
            env: EnvName::new(self.env),
            status: parse_status(&self.status)?,
            last_message: self.last_message,
            component: self.component,
            issue_comment: self.issue_comment,
            started_at: sqlite_to_iso8601(&self.started_at),
            updated_at: sqlite_to_iso8601(&self.updated_at),
            ended_at: self.ended_at.as_deref().map(sqlite_to_iso8601),
        })
    }
}

fn parse_status(raw: &str) -> error::Result<RunStatus> {
    raw.parse::<RunStatus>()
        .map_err(|e| StateError::Corrupt(format!("pipeline_runs.status: {e}")))
}

/// Whether a run in `from` may move to `to`.
fn transition_allowed(from: RunStatus, to: RunStatus) -> bool {
    match to {
        RunStatus::Pending => false,
        RunStatus::Processing => matches!(from, RunStatus::Pending | RunStatus::Processing),
        RunStatus::Completed | RunStatus::Failed => !from.is_terminal(),
    }
}

impl SqliteLedger {
    /// Open or create a ledger database at `path`.
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

    /// Create an in-memory ledger (for testing).
    ///
    /// # Errors
    ///
    /// Returns a `SQLite` error if the database can't be initialized.
    pub fn in_memory() -> error::Result<Self> {
        Ok(Self {
            conn: Mutex::new(in_memory_with_schema(CREATE_TABLES)?),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Move a run to `to`, appending a history entry in the same transaction.
    fn transition(
        &self,
        operation: &'static str,
        run_id: &RunId,
        to: RunStatus,
        message: Option<&str>,
        component: &str,
        issue_comment: Option<&str>,
    ) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::context(operation, e))?;

        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM pipeline_runs WHERE id = ?1",
                [run_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StateError::context(operation, e))?;
        let Some(current) = current else {
            return Err(StateError::RunNotFound(run_id.clone()));
        };
        let from = parse_status(&current)?;
        if !transition_allowed(from, to) {
            return Err(StateError::InvalidTransition {
                run_id: run_id.clone(),
                from,
                to,
            });
        }

        let now = now_sqlite();
        let ended_at = to.is_terminal().then(|| now.clone());
        tx.execute(
            "UPDATE pipeline_runs SET status = ?1, last_message = COALESCE(?2, last_message), \
             component = ?3, issue_comment = COALESCE(?4, issue_comment), \
             updated_at = ?5, ended_at = ?6 WHERE id = ?7",
            rusqlite::params![
                to.as_str(),
                message,
                component,
                issue_comment,
                now,
                ended_at,
                run_id.as_str(),
            ],
        )
        .map_err(|e| StateError::context(operation, e))?;
        tx.execute(
            "INSERT INTO pipeline_run_events (run_id, status, message, component, recorded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                run_id.as_str(),
                to.as_str(),
                message.or(issue_comment),
                component,
                now,
            ],
        )
        .map_err(|e| StateError::context(operation, e))?;
        tx.commit().map_err(|e| StateError::context(operation, e))?;

        tracing::debug!(
            run_id = run_id.as_str(),
            from = %from,
            to = %to,
            component,
            "Ledger transition recorded"
        );
        Ok(())
    }
}

impl ExecutionLedger for SqliteLedger {
    fn start_run(&self, pipeline: &str, env: &EnvName) -> error::Result<RunId> {
        let run_id = RunId::new(uuid::Uuid::new_v4().to_string());
        let now = now_sqlite();

        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::context("start_run: begin tx", e))?;
        tx.execute(
            "INSERT INTO pipeline_runs (id, pipeline, env, status, started_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![
                run_id.as_str(),
                pipeline,
                env.as_str(),
                RunStatus::Pending.as_str(),
                now,
            ],
        )
        .map_err(|e| StateError::context("start_run: insert run", e))?;
        tx.execute(
            "INSERT INTO pipeline_run_events (run_id, status, message, recorded_at) \
             VALUES (?1, ?2, 'Pipeline execution started', ?3)",
            rusqlite::params![run_id.as_str(), RunStatus::Pending.as_str(), now],
        )
        .map_err(|e| StateError::context("start_run: insert event", e))?;
        tx.commit()
            .map_err(|e| StateError::context("start_run: commit", e))?;

        Ok(run_id)
    }

    fn attach_to_run(&self, run_id: &RunId) -> error::Result<RunRecord> {
        self.get_run(run_id)?
            .ok_or_else(|| StateError::RunNotFound(run_id.clone()))
    }

    fn update_status(&self, run_id: &RunId, message: &str, component: &str) -> error::Result<()> {
        self.transition(
            "update_status",
            run_id,
            RunStatus::Processing,
            Some(message),
            component,
            None,
        )
    }

    fn mark_failed(
        &self,
        run_id: &RunId,
        component: &str,
        issue_comment: &str,
    ) -> error::Result<()> {
        self.transition(
            "mark_failed",
            run_id,
            RunStatus::Failed,
            None,
            component,
            Some(issue_comment),
        )
    }

    fn complete_run(&self, run_id: &RunId, component: &str) -> error::Result<()> {
        self.transition(
            "complete_run",
            run_id,
            RunStatus::Completed,
            None,
            component,
            None,
        )
    }

    fn get_run(&self, run_id: &RunId) -> error::Result<Option<RunRecord>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT id, pipeline, env, status, last_message, component, issue_comment, \
                 started_at, updated_at, ended_at FROM pipeline_runs WHERE id = ?1",
                [run_id.as_str()],
                |row| {
                    Ok(RunRow {
                        id: row.get(0)?,
                        pipeline: row.get(1)?,
                        env: row.get(2)?,
                        status: row.get(3)?,
                        last_message: row.get(4)?,
                        component: row.get(5)?,
                        issue_comment: row.get(6)?,
                        started_at: row.get(7)?,
                        updated_at: row.get(8)?,
                        ended_at: row.get(9)?,
                    })
                },
            )
            .optional()
            .map_err(|e| StateError::context("get_run", e))?;
        row.map(RunRow::into_record).transpose()
    }

    fn history(&self, run_id: &RunId) -> error::Result<Vec<RunEvent>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT seq, status, message, component, recorded_at \
                 FROM pipeline_run_events WHERE run_id = ?1 ORDER BY seq",
            )
            .map_err(|e| StateError::context("history: prepare", e))?;
        let rows = stmt
            .query_map([run_id.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| StateError::context("history: query", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StateError::context("history: read row", e))?;

        rows.into_iter()
            .map(|(seq, status, message, component, recorded_at)| {
                Ok(RunEvent {
                    seq,
                    status: parse_status(&status)?,
                    message,
                    component,
                    recorded_at: sqlite_to_iso8601(&recorded_at),
                })
            })
            .collect()
    }
}
