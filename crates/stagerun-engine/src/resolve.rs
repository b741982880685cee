//! Builds stores, ledgers, workspace and transform registry from config.

use std::sync::Arc;

use anyhow::{Context, Result};
use stagerun_state::{ExecutionLedger, ManifestTable, SqliteLedger, SqliteManifestTable};

use crate::config::types::StageConfig;
use crate::controller::StageController;
use crate::ledgers::LedgerRegistry;
use crate::transform::copy::{CopyTransform, COPY_TRANSFORM};
use crate::transform::TransformRegistry;
use crate::workspace::Workspace;

/// Open the manifest control table.
///
/// # Errors
///
/// Returns an error if the database can't be opened.
pub fn create_manifest_table(config: &StageConfig) -> Result<Arc<dyn ManifestTable>> {
    let table = SqliteManifestTable::open(&config.manifest.path).with_context(|| {
        format!(
            "Failed to open manifest table: {}",
            config.manifest.path.display()
        )
    })?;
    Ok(Arc::new(table))
}

/// Open one ledger per configured environment.
///
/// # Errors
///
/// Returns an error if any ledger database can't be opened.
pub fn create_ledgers(config: &StageConfig) -> Result<LedgerRegistry> {
    let mut registry = LedgerRegistry::new();
    for (env, env_config) in &config.environments {
        let ledger: Arc<dyn ExecutionLedger> = Arc::new(
            SqliteLedger::open(&env_config.ledger.path).with_context(|| {
                format!(
                    "Failed to open ledger for environment '{env}': {}",
                    env_config.ledger.path.display()
                )
            })?,
        );
        tracing::debug!(env = %env, path = %env_config.ledger.path.display(), "Ledger opened");
        registry.insert(env.clone(), ledger);
    }
    Ok(registry)
}

/// Registry holding the built-in transforms, without any bindings.
#[must_use]
pub fn builtin_transforms(config: &StageConfig) -> TransformRegistry {
    let mut registry = TransformRegistry::new();
    registry.register(
        COPY_TRANSFORM,
        CopyTransform::factory(config.storage_root.clone(), config.output_bucket.clone()),
    );
    registry
}

/// Built-in transforms plus the configured defaults and dataset bindings.
#[must_use]
pub fn create_transform_registry(config: &StageConfig) -> TransformRegistry {
    let mut registry = builtin_transforms(config);
    for (stage, name) in &config.default_transforms {
        registry.set_default(stage.clone(), name.clone());
    }
    for dataset in &config.datasets {
        for (stage, name) in &dataset.transforms {
            registry.bind(
                dataset.team.clone(),
                dataset.dataset.clone(),
                stage.clone(),
                name.clone(),
            );
        }
    }
    registry
}

/// Wire a controller from configuration.
///
/// # Errors
///
/// Returns an error if a store can't be opened or the workspace can't be
/// created.
pub fn create_controller(config: &StageConfig) -> Result<StageController> {
    let workspace = Workspace::acquire(&config.workspace).with_context(|| {
        format!("Failed to create workspace: {}", config.workspace.display())
    })?;
    StageController::builder()
        .ledgers(create_ledgers(config)?)
        .manifest(create_manifest_table(config)?)
        .resolver(Arc::new(create_transform_registry(config)))
        .workspace(workspace)
        .build()
}
