//! Semantic validation for parsed stage configuration.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Result};

use crate::config::types::StageConfig;

fn path_is_blank(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().trim().is_empty()
}

/// Validate a parsed configuration.
///
/// # Errors
///
/// Returns an error listing every validation failure found.
pub fn validate_config(config: &StageConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported config version '{}', expected '1.0'",
            config.version
        ));
    }

    if path_is_blank(&config.workspace) {
        errors.push("workspace must not be empty".to_string());
    } else if config.workspace == Path::new("/") {
        errors.push("workspace must not be the filesystem root".to_string());
    }

    if config.output_bucket.trim().is_empty() {
        errors.push("output_bucket must not be empty".to_string());
    }

    if path_is_blank(&config.manifest.path) {
        errors.push("manifest.path must not be empty".to_string());
    }

    if config.environments.is_empty() {
        errors.push("At least one environment must be configured".to_string());
    }
    for (env, env_config) in &config.environments {
        if env.as_str().trim().is_empty() {
            errors.push("Environment names must not be empty".to_string());
        }
        if path_is_blank(&env_config.ledger.path) {
            errors.push(format!("environments.{env}.ledger.path must not be empty"));
        }
    }

    for (stage, name) in &config.default_transforms {
        if name.trim().is_empty() {
            errors.push(format!("default_transforms.{stage} must name a transform"));
        }
    }

    let mut seen = BTreeSet::new();
    for (i, dataset) in config.datasets.iter().enumerate() {
        if dataset.team.trim().is_empty() {
            errors.push(format!("datasets[{i}] has an empty team"));
        }
        if dataset.dataset.trim().is_empty() {
            errors.push(format!("datasets[{i}] has an empty dataset"));
        }
        if !seen.insert((dataset.team.as_str(), dataset.dataset.as_str())) {
            errors.push(format!(
                "Duplicate dataset entry '{}/{}'",
                dataset.team, dataset.dataset
            ));
        }
        for (stage, name) in &dataset.transforms {
            if name.trim().is_empty() {
                errors.push(format!("datasets[{i}].transforms.{stage} must name a transform"));
            }
        }
    }

    if !errors.is_empty() {
        bail!("Config validation failed:\n  - {}", errors.join("\n  - "));
    }
    Ok(())
}

/// Check that every transform name the configuration uses is in `known`.
///
/// # Errors
///
/// Returns an error listing the unknown names.
pub fn validate_transform_refs(config: &StageConfig, known: &[&str]) -> Result<()> {
    let unknown: Vec<&str> = config
        .referenced_transforms()
        .into_iter()
        .filter(|name| !known.contains(name))
        .collect();
    if !unknown.is_empty() {
        bail!("Unknown transform(s) in config: {}", unknown.join(", "));
    }
    Ok(())
}
