use std::path::Path;

use anyhow::Result;
use stagerun_engine::resolve;

/// Execute the `transforms` command: list transforms and stage bindings.
pub async fn execute(config_path: &Path) -> Result<()> {
    let config = super::load_config(config_path)?;
    let registry = resolve::create_transform_registry(&config);

    println!("Registered transforms:");
    for name in registry.names() {
        println!("  {name}");
    }

    if !config.default_transforms.is_empty() {
        println!("\nStage defaults:");
        for (stage, name) in &config.default_transforms {
            println!("  {stage:12} {name}");
        }
    }

    if !config.datasets.is_empty() {
        println!("\nDataset bindings:");
        for dataset in &config.datasets {
            for (stage, name) in &dataset.transforms {
                println!(
                    "  {}/{} {stage:12} {name}",
                    dataset.team, dataset.dataset
                );
            }
        }
    }
    Ok(())
}
