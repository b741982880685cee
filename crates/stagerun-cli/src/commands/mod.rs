pub mod check;
pub mod invoke;
pub mod manifest;
pub mod runs;
pub mod transforms;

use std::path::Path;

use anyhow::{Context, Result};
use stagerun_engine::config::types::StageConfig;
use stagerun_engine::config::{parser, validator};

/// Parse and validate a stage config file.
pub(crate) fn load_config(config_path: &Path) -> Result<StageConfig> {
    let config = parser::parse_config(config_path)
        .with_context(|| format!("Failed to parse config: {}", config_path.display()))?;
    validator::validate_config(&config)?;
    Ok(config)
}
