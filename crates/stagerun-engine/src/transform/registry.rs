//! Name-based transform registry with per-dataset bindings.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Transform, TransformFactory, TransformResolver};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// No binding or default names a transform for this stage.
    #[error("no transform configured for team '{team}', dataset '{dataset}', stage '{stage}'")]
    NotFound {
        team: String,
        dataset: String,
        stage: String,
    },

    /// A binding names a transform that was never registered.
    #[error("transform '{name}' (for team '{team}', dataset '{dataset}', stage '{stage}') is not registered")]
    Unregistered {
        name: String,
        team: String,
        dataset: String,
        stage: String,
    },
}

/// Two-level lookup: `(team, dataset, stage)` names a transform, and the
/// name selects a factory. Stages without a dataset binding fall back to
/// the stage default.
#[derive(Default, Clone)]
pub struct TransformRegistry {
    factories: BTreeMap<String, TransformFactory>,
    bindings: BTreeMap<(String, String, String), String>,
    defaults: BTreeMap<String, String>,
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .field("bindings", &self.bindings)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl TransformRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<Box<dyn Transform>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Bind `(team, dataset, stage)` to the transform called `name`.
    pub fn bind(
        &mut self,
        team: impl Into<String>,
        dataset: impl Into<String>,
        stage: impl Into<String>,
        name: impl Into<String>,
    ) -> &mut Self {
        self.bindings
            .insert((team.into(), dataset.into(), stage.into()), name.into());
        self
    }

    /// Transform used for `stage` when a dataset has no binding of its own.
    pub fn set_default(&mut self, stage: impl Into<String>, name: impl Into<String>) -> &mut Self {
        self.defaults.insert(stage.into(), name.into());
        self
    }

    /// Registered transform names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    fn transform_name(&self, team: &str, dataset: &str, stage: &str) -> Option<&str> {
        self.bindings
            .get(&(team.to_string(), dataset.to_string(), stage.to_string()))
            .or_else(|| self.defaults.get(stage))
            .map(String::as_str)
    }
}

impl TransformResolver for TransformRegistry {
    fn resolve(
        &self,
        team: &str,
        dataset: &str,
        stage: &str,
    ) -> Result<TransformFactory, ResolveError> {
        let name = self
            .transform_name(team, dataset, stage)
            .ok_or_else(|| ResolveError::NotFound {
                team: team.to_string(),
                dataset: dataset.to_string(),
                stage: stage.to_string(),
            })?;
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ResolveError::Unregistered {
                name: name.to_string(),
                team: team.to_string(),
                dataset: dataset.to_string(),
                stage: stage.to_string(),
            })?;
        tracing::debug!(team, dataset, stage, transform = name, "Transform resolved");
        Ok(Arc::clone(factory))
    }
}
