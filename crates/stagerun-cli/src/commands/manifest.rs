use std::path::Path;

use anyhow::Result;
use stagerun_engine::resolve;
use stagerun_state::ManifestTable;
use stagerun_types::ids::ManifestKey;

/// Execute `manifest register`.
pub async fn register(config_path: &Path, key: &str, dataset: &str, datafile: &str) -> Result<()> {
    let config = super::load_config(config_path)?;
    let table = resolve::create_manifest_table(&config)?;
    table.register(&ManifestKey::new(key), dataset, datafile)?;
    println!("Registered manifest record '{key}'.");
    Ok(())
}

/// Execute `manifest show`: print the record as JSON.
pub async fn show(config_path: &Path, key: &str) -> Result<()> {
    let config = super::load_config(config_path)?;
    let table = resolve::create_manifest_table(&config)?;
    let Some(record) = table.get(&ManifestKey::new(key))? else {
        anyhow::bail!("Manifest record '{key}' not found");
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
