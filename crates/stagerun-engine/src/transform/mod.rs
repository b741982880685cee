//! Pluggable transforms and their resolution.
//!
//! A transform turns one stored object into a [`TransformResponse`]. The
//! controller never constructs transforms directly: it asks a
//! [`TransformResolver`] for a factory keyed by `(team, dataset, stage)`
//! and builds a fresh instance per invocation.

pub mod copy;
pub mod registry;

use std::path::Path;
use std::sync::Arc;

use stagerun_types::response::TransformResponse;

pub use copy::CopyTransform;
pub use registry::{ResolveError, TransformRegistry};

/// Object handed to a transform.
#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub team: &'a str,
    pub dataset: &'a str,
    /// Scratch directory; emptied after every invocation.
    pub workspace: &'a Path,
}

/// One transform instance, used for a single invocation.
pub trait Transform: Send {
    /// Process the object described by `request`.
    ///
    /// # Errors
    ///
    /// Any error aborts the stage and is reported back to the caller after
    /// the run and manifest are marked failed.
    fn transform_object(
        &mut self,
        request: &TransformRequest<'_>,
    ) -> anyhow::Result<TransformResponse>;
}

/// Builds a fresh transform instance.
pub type TransformFactory = Arc<dyn Fn() -> anyhow::Result<Box<dyn Transform>> + Send + Sync>;

/// Maps a pipeline-stage identity to a transform factory.
pub trait TransformResolver: Send + Sync {
    /// Deterministic for the same identifiers and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if nothing is registered for the triple.
    fn resolve(
        &self,
        team: &str,
        dataset: &str,
        stage: &str,
    ) -> Result<TransformFactory, ResolveError>;
}
