//! Stage execution controller.
//!
//! One call to [`StageController::execute`] is one stage invocation:
//!
//! 1. parse the invocation context and attach to the run (preconditions,
//!    no writes on failure);
//! 2. resolve and run the transform, then record `PROCESSING` in the
//!    ledger and manifest;
//! 3. on any failure in step 2, mark the run and manifest `FAILED` and
//!    return the original error.
//!
//! Each invocation gets its own workspace directory, emptied on every path.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use stagerun_state::{ExecutionLedger, ManifestTable};
use stagerun_types::event::{InvocationMeta, StageEvent};
use stagerun_types::response::TransformResponse;
use stagerun_types::status::ManifestStatus;

use crate::context::{ContextError, InvocationContext};
use crate::error::{CompensationError, FailureKind, PreconditionError, StageError};
use crate::ledgers::LedgerRegistry;
use crate::transform::{TransformRequest, TransformResolver};
use crate::workspace::{Workspace, WorkspaceScope};

/// Result of the stage body, before compensation.
#[derive(Debug)]
pub enum Outcome {
    Success(TransformResponse),
    Failure {
        kind: FailureKind,
        error: anyhow::Error,
    },
}

impl From<Result<TransformResponse, (FailureKind, anyhow::Error)>> for Outcome {
    fn from(result: Result<TransformResponse, (FailureKind, anyhow::Error)>) -> Self {
        match result {
            Ok(response) => Self::Success(response),
            Err((kind, error)) => Self::Failure { kind, error },
        }
    }
}

/// Drives one stage invocation against injected ledger, manifest,
/// resolver and workspace handles.
pub struct StageController {
    ledgers: LedgerRegistry,
    manifest: Arc<dyn ManifestTable>,
    resolver: Arc<dyn TransformResolver>,
    workspace: Workspace,
}

impl StageController {
    #[must_use]
    pub fn builder() -> StageControllerBuilder {
        StageControllerBuilder::new()
    }

    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    #[must_use]
    pub fn ledgers(&self) -> &LedgerRegistry {
        &self.ledgers
    }

    #[must_use]
    pub fn manifest(&self) -> &Arc<dyn ManifestTable> {
        &self.manifest
    }

    /// Run one stage invocation from a raw JSON event.
    ///
    /// # Errors
    ///
    /// As [`StageController::execute`]; an event that doesn't deserialize
    /// is a precondition failure.
    pub fn execute_value(
        &self,
        event: &serde_json::Value,
        meta: &InvocationMeta,
    ) -> Result<TransformResponse, StageError> {
        match StageEvent::deserialize(event) {
            Ok(event) => self.execute(&event, meta),
            Err(e) => {
                // Rejected invocations still get, and release, a workspace.
                let _scope = self.workspace.scope();
                let err = PreconditionError::Event(ContextError::Malformed(e));
                tracing::warn!(error = %err, "Stage invocation rejected");
                Err(err.into())
            }
        }
    }

    /// Run one stage invocation.
    ///
    /// Returns the transform's response unchanged on success.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Precondition`] if the invocation directory
    /// can't be created, the event is invalid, the environment has no
    /// ledger, or the run can't be attached; nothing is written in that
    /// case. Any later failure is returned as [`StageError::Failed`] after
    /// the run and manifest are marked `FAILED`.
    pub fn execute(
        &self,
        event: &StageEvent,
        meta: &InvocationMeta,
    ) -> Result<TransformResponse, StageError> {
        let mut scope = match self.workspace.scope() {
            Ok(scope) => scope,
            Err(source) => {
                let err = PreconditionError::Workspace {
                    root: self.workspace.root().to_path_buf(),
                    source,
                };
                tracing::warn!(
                    run_id = %event.body.run_id,
                    error = %err,
                    "Stage invocation rejected"
                );
                return Err(err.into());
            }
        };

        let (ctx, ledger) = match self.preconditions(event, meta) {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(
                    run_id = %event.body.run_id,
                    stage = %event.body.stage,
                    error = %err,
                    "Stage invocation rejected"
                );
                return Err(err.into());
            }
        };

        tracing::info!(
            run_id = %ctx.run_id,
            env = %ctx.env,
            team = %ctx.team,
            dataset = %ctx.dataset,
            stage = %ctx.stage,
            component = %ctx.component,
            key = %ctx.key,
            "Stage invocation started"
        );

        match Outcome::from(self.run_stage(&ctx, ledger.as_ref(), &mut scope)) {
            Outcome::Success(response) => {
                tracing::info!(
                    run_id = %ctx.run_id,
                    stage = %ctx.stage,
                    manifest_key = %ctx.manifest_key,
                    elements = response.len(),
                    "Stage processed"
                );
                Ok(response)
            }
            Outcome::Failure { kind, error } => {
                Err(self.compensate(&ctx, ledger.as_ref(), &mut scope, kind, error))
            }
        }
    }

    fn preconditions(
        &self,
        event: &StageEvent,
        meta: &InvocationMeta,
    ) -> Result<(InvocationContext, Arc<dyn ExecutionLedger>), PreconditionError> {
        let ctx = InvocationContext::from_event(event, meta)?;
        let ledger = self
            .ledgers
            .get(&ctx.env)
            .ok_or_else(|| PreconditionError::UnknownEnvironment(ctx.env.clone()))?;
        ledger
            .attach_to_run(&ctx.run_id)
            .map_err(|source| PreconditionError::Attach {
                run_id: ctx.run_id.clone(),
                source,
            })?;
        Ok((ctx, ledger))
    }

    fn run_stage(
        &self,
        ctx: &InvocationContext,
        ledger: &dyn ExecutionLedger,
        scope: &mut WorkspaceScope<'_>,
    ) -> Result<TransformResponse, (FailureKind, anyhow::Error)> {
        let factory = self
            .resolver
            .resolve(&ctx.team, &ctx.dataset, &ctx.stage)
            .map_err(|e| (FailureKind::Resolution, anyhow::Error::from(e)))?;
        let mut transform = panic::catch_unwind(AssertUnwindSafe(|| factory()))
            .unwrap_or_else(|payload| {
                Err(anyhow::anyhow!("factory panicked: {}", panic_message(&*payload)))
            })
            .context("failed to instantiate transform")
            .map_err(|e| (FailureKind::Resolution, e))?;

        let request = TransformRequest {
            bucket: &ctx.bucket,
            key: &ctx.key,
            team: &ctx.team,
            dataset: &ctx.dataset,
            workspace: scope.root(),
        };
        // A panicking transform is a transform failure and gets compensated.
        let response =
            panic::catch_unwind(AssertUnwindSafe(|| transform.transform_object(&request)))
                .unwrap_or_else(|payload| {
                    Err(anyhow::anyhow!("transform panicked: {}", panic_message(&*payload)))
                })
                .map_err(|e| (FailureKind::Transform, e))?;

        let report = scope
            .clean()
            .map_err(|e| (FailureKind::Cleanup, anyhow::Error::from(e)))?;
        tracing::debug!(
            files = report.files_removed,
            dirs = report.dirs_removed,
            "Workspace cleaned"
        );

        ledger
            .update_status(&ctx.run_id, &ctx.processing_message(), &ctx.component)
            .map_err(|e| (FailureKind::LedgerUpdate, anyhow::Error::from(e)))?;

        self.manifest
            .update_stage_status(
                &ctx.manifest_key,
                &ctx.stage,
                ManifestStatus::Processing,
                Some(&response.status_payload()),
            )
            .map_err(|e| (FailureKind::ManifestUpdate, anyhow::Error::from(e)))?;

        Ok(response)
    }

    fn compensate(
        &self,
        ctx: &InvocationContext,
        ledger: &dyn ExecutionLedger,
        scope: &mut WorkspaceScope<'_>,
        kind: FailureKind,
        error: anyhow::Error,
    ) -> StageError {
        tracing::error!(
            run_id = %ctx.run_id,
            stage = %ctx.stage,
            component = %ctx.component,
            manifest_key = %ctx.manifest_key,
            kind = %kind,
            error = ?error,
            "Stage failed"
        );

        let mut compensation = Vec::new();

        let comment = ctx.error_comment(&format!("{error:#}"));
        if let Err(e) = ledger.mark_failed(&ctx.run_id, &ctx.component, &comment) {
            compensation.push(CompensationError {
                step: "ledger",
                source: e.into(),
            });
        }
        if let Err(e) = scope.clean() {
            compensation.push(CompensationError {
                step: "cleanup",
                source: e.into(),
            });
        }
        if let Err(e) = self.manifest.update_stage_status(
            &ctx.manifest_key,
            &ctx.stage,
            ManifestStatus::Failed,
            None,
        ) {
            compensation.push(CompensationError {
                step: "manifest",
                source: e.into(),
            });
        }

        for failure in &compensation {
            tracing::error!(
                run_id = %ctx.run_id,
                step = failure.step,
                error = %format!("{:#}", failure.source),
                "Compensation step failed"
            );
        }

        StageError::Failed {
            kind,
            error,
            compensation,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Builder for [`StageController`]. Every handle is required.
#[derive(Default)]
pub struct StageControllerBuilder {
    ledgers: Option<LedgerRegistry>,
    manifest: Option<Arc<dyn ManifestTable>>,
    resolver: Option<Arc<dyn TransformResolver>>,
    workspace: Option<Workspace>,
}

impl StageControllerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ledgers(mut self, ledgers: LedgerRegistry) -> Self {
        self.ledgers = Some(ledgers);
        self
    }

    #[must_use]
    pub fn manifest(mut self, manifest: Arc<dyn ManifestTable>) -> Self {
        self.manifest = Some(manifest);
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn TransformResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn workspace(mut self, workspace: Workspace) -> Self {
        self.workspace = Some(workspace);
        self
    }

    /// Build the controller.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first handle that was not set.
    pub fn build(self) -> anyhow::Result<StageController> {
        let Some(ledgers) = self.ledgers else {
            anyhow::bail!("StageControllerBuilder: ledgers are required");
        };
        let Some(manifest) = self.manifest else {
            anyhow::bail!("StageControllerBuilder: manifest table is required");
        };
        let Some(resolver) = self.resolver else {
            anyhow::bail!("StageControllerBuilder: transform resolver is required");
        };
        let Some(workspace) = self.workspace else {
            anyhow::bail!("StageControllerBuilder: workspace is required");
        };
        Ok(StageController {
            ledgers,
            manifest,
            resolver,
            workspace,
        })
    }
}
