//! Invocation event wire format.
//!
//! The scheduler hands every invocation a JSON envelope whose `body`
//! describes the object to process and the run it belongs to.

use serde::{Deserialize, Serialize};

use crate::ids::{EnvName, ManifestKey, RunId};

/// Top-level invocation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub body: StageEventBody,
}

/// Fields the stage controller reads from `event.body`.
///
/// Unknown fields are ignored so upstream steps can forward extra context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEventBody {
    pub bucket: String,
    pub key: String,
    pub team: String,
    #[serde(rename = "pipeline_stage")]
    pub stage: String,
    pub dataset: String,
    #[serde(rename = "manifest_ddb_key")]
    pub manifest_key: ManifestKey,
    pub env: EnvName,
    #[serde(rename = "peh_id")]
    pub run_id: RunId,
}

/// What the host knows about the function being invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationMeta {
    /// Dash-delimited function identity, e.g. `"sdlf-engineering-stageA-process"`.
    pub function_name: String,
}

impl InvocationMeta {
    #[must_use]
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
        }
    }
}
