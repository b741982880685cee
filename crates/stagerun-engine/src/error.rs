//! Stage error model.
//!
//! `Precondition` failures happen before the controller has committed to a
//! run and carry no compensating writes. `Failed` covers everything after
//! attach: the triggering error plus whatever went wrong while recording
//! the failure.

use stagerun_state::StateError;
use stagerun_types::ids::{EnvName, RunId};

use crate::context::ContextError;

/// The invocation never reached the transform.
#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    #[error(transparent)]
    Event(#[from] ContextError),

    #[error("no ledger configured for environment '{0}'")]
    UnknownEnvironment(EnvName),

    #[error("cannot acquire invocation workspace under '{}': {source}", .root.display())]
    Workspace {
        root: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot attach to pipeline run '{run_id}': {source}")]
    Attach {
        run_id: RunId,
        #[source]
        source: StateError,
    },
}

/// Which step of the stage produced the triggering failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Resolution,
    Transform,
    Cleanup,
    LedgerUpdate,
    ManifestUpdate,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolution => "resolution",
            Self::Transform => "transform",
            Self::Cleanup => "cleanup",
            Self::LedgerUpdate => "ledger_update",
            Self::ManifestUpdate => "manifest_update",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compensating step that could not be completed.
#[derive(Debug)]
pub struct CompensationError {
    /// `"ledger"`, `"cleanup"` or `"manifest"`.
    pub step: &'static str,
    pub source: anyhow::Error,
}

impl std::fmt::Display for CompensationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} compensation failed: {:#}", self.step, self.source)
    }
}

/// Error returned by [`StageController::execute`](crate::StageController::execute).
#[derive(Debug)]
pub enum StageError {
    /// Nothing was written; the run and manifest are untouched.
    Precondition(PreconditionError),
    /// The stage failed after attach. Compensation has been attempted.
    Failed {
        kind: FailureKind,
        error: anyhow::Error,
        compensation: Vec<CompensationError>,
    },
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Precondition(e) => write!(f, "precondition failed: {e}"),
            Self::Failed {
                kind,
                error,
                compensation,
            } => {
                write!(f, "stage {kind} failed: {error:#}")?;
                if !compensation.is_empty() {
                    write!(f, " ({} compensation step(s) also failed)", compensation.len())?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Precondition(e) => Some(e),
            Self::Failed { error, .. } => Some(&**error),
        }
    }
}

impl From<PreconditionError> for StageError {
    fn from(e: PreconditionError) -> Self {
        Self::Precondition(e)
    }
}

impl StageError {
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }

    /// Step that triggered the failure; `None` for precondition errors.
    #[must_use]
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Precondition(_) => None,
            Self::Failed { kind, .. } => Some(*kind),
        }
    }

    /// The triggering stage error; `None` for precondition errors.
    #[must_use]
    pub fn stage_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Precondition(_) => None,
            Self::Failed { error, .. } => Some(error),
        }
    }

    #[must_use]
    pub fn compensation_errors(&self) -> &[CompensationError] {
        match self {
            Self::Precondition(_) => &[],
            Self::Failed { compensation, .. } => compensation,
        }
    }
}
