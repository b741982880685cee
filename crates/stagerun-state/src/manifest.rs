//! Manifest control table trait definition.

use stagerun_types::ids::ManifestKey;
use stagerun_types::state::ManifestRecord;
use stagerun_types::status::ManifestStatus;

use crate::error;

/// Storage contract for per-object, per-stage control records.
///
/// Stage writes are last-writer-wins; coordination between concurrent
/// writers of the same key belongs to whoever schedules them.
pub trait ManifestTable: Send + Sync {
    /// Register a new control record.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ManifestExists`](crate::StateError::ManifestExists)
    /// if `key` is already registered.
    fn register(&self, key: &ManifestKey, dataset: &str, datafile: &str) -> error::Result<()>;

    /// Set `stage`'s status on an existing record.
    ///
    /// `payload` is kept from an earlier write when `None` is passed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ManifestNotFound`](crate::StateError::ManifestNotFound)
    /// if `key` was never registered.
    fn update_stage_status(
        &self,
        key: &ManifestKey,
        stage: &str,
        status: ManifestStatus,
        payload: Option<&str>,
    ) -> error::Result<()>;

    /// Read a record with all its stage rows; `Ok(None)` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get(&self, key: &ManifestKey) -> error::Result<Option<ManifestRecord>>;
}
