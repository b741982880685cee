//! Common imports for ledger and manifest consumers.

pub use crate::error::StateError;
pub use crate::ledger::ExecutionLedger;
pub use crate::manifest::ManifestTable;
pub use crate::sqlite::{SqliteLedger, SqliteManifestTable};
pub use stagerun_types::ids::{EnvName, ManifestKey, RunId};
pub use stagerun_types::status::{ManifestStatus, RunStatus};
