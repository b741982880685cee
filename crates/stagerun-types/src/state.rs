//! Ledger and manifest record types.
//!
//! Pure data returned by the ledger and manifest clients. Timestamps are
//! ISO-8601 UTC strings (e.g. `"2026-01-15T10:00:00Z"`); backends handle
//! formatting internally.

use serde::{Deserialize, Serialize};

use crate::ids::{EnvName, ManifestKey, RunId};
use crate::status::{ManifestStatus, RunStatus};

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Current projection of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub pipeline: String,
    pub env: EnvName,
    pub status: RunStatus,
    /// Latest status message (e.g. `"StageA Stagea Processing"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// Component that made the latest transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Set when the run is marked failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_comment: Option<String>,
    pub started_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
}

/// One appended entry in a run's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: i64,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub recorded_at: String,
}

// ---------------------------------------------------------------------------
// Manifest control table
// ---------------------------------------------------------------------------

/// Control record for one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub key: ManifestKey,
    pub dataset: String,
    pub datafile: String,
    pub created_at: String,
    /// Per-stage status rows, ordered by stage name.
    #[serde(default)]
    pub stages: Vec<StageStatus>,
}

impl ManifestRecord {
    /// Status row for `stage`, if one was ever written.
    #[must_use]
    pub fn stage(&self, stage: &str) -> Option<&StageStatus> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

/// Processing status of one stage of one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatus {
    pub stage: String,
    pub status: ManifestStatus,
    /// Status token attached by the last `PROCESSING` write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    pub updated_at: String,
}
