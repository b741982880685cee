//! Ledger and manifest client error types.

use stagerun_types::ids::{ManifestKey, RunId};
use stagerun_types::status::RunStatus;

/// Errors produced by [`ExecutionLedger`](crate::ExecutionLedger) and
/// [`ManifestTable`](crate::ManifestTable) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// `SQLite` failure tagged with the operation that hit it.
    #[error("{operation}: sqlite error: {source}")]
    SqliteContext {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("state backend lock poisoned")]
    LockPoisoned,

    /// No run with this id exists in the ledger.
    #[error("pipeline run '{0}' not found")]
    RunNotFound(RunId),

    /// The run cannot make the requested status transition.
    #[error("pipeline run '{run_id}' is {from} and cannot move to {to}")]
    InvalidTransition {
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
    },

    /// No manifest record with this key exists.
    #[error("manifest record '{0}' not found")]
    ManifestNotFound(ManifestKey),

    /// A manifest record with this key is already registered.
    #[error("manifest record '{0}' already registered")]
    ManifestExists(ManifestKey),

    /// A stored row holds a value this version cannot interpret.
    #[error("corrupt state row: {0}")]
    Corrupt(String),
}

impl StateError {
    /// Wrap a `rusqlite` error with the name of the failing operation.
    pub(crate) fn context(operation: &'static str, source: rusqlite::Error) -> Self {
        Self::SqliteContext { operation, source }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;
