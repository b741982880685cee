//! Execution ledger trait definition.
//!
//! The ledger is an append-only history of pipeline-run status
//! transitions. Model types live in [`stagerun_types::state`].

use stagerun_types::ids::{EnvName, RunId};
use stagerun_types::state::{RunEvent, RunRecord};

use crate::error;

/// Storage contract for pipeline-run history.
///
/// Every mutation appends one [`RunEvent`] and updates the run's
/// [`RunRecord`] projection atomically. Mutating a terminal run
/// (`COMPLETED` or `FAILED`) fails with
/// [`StateError::InvalidTransition`](crate::StateError::InvalidTransition).
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn ExecutionLedger>`.
pub trait ExecutionLedger: Send + Sync {
    /// Create a new run in `PENDING` status.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn start_run(&self, pipeline: &str, env: &EnvName) -> error::Result<RunId>;

    /// Look up an already-started run. Never creates one.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::RunNotFound`](crate::StateError::RunNotFound)
    /// if the run does not exist.
    fn attach_to_run(&self, run_id: &RunId) -> error::Result<RunRecord>;

    /// Record a `PROCESSING` status message on behalf of `component`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) if the run is
    /// unknown or terminal, or on storage failure.
    fn update_status(&self, run_id: &RunId, message: &str, component: &str) -> error::Result<()>;

    /// Mark the run `FAILED` with an operator-facing comment.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) if the run is
    /// unknown or terminal, or on storage failure.
    fn mark_failed(&self, run_id: &RunId, component: &str, issue_comment: &str)
        -> error::Result<()>;

    /// Mark the run `COMPLETED`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) if the run is
    /// unknown or terminal, or on storage failure.
    fn complete_run(&self, run_id: &RunId, component: &str) -> error::Result<()>;

    /// Read the run projection; `Ok(None)` if the run does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get_run(&self, run_id: &RunId) -> error::Result<Option<RunRecord>>;

    /// All history entries of a run, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn history(&self, run_id: &RunId) -> error::Result<Vec<RunEvent>>;
}
