use std::path::Path;

use anyhow::Result;
use stagerun_engine::config::validator;
use stagerun_engine::resolve;

/// Execute the `check` command: validate config and open every store.
pub async fn execute(config_path: &Path) -> Result<()> {
    let config = super::load_config(config_path)?;
    println!("Config structure:  OK");

    let registry = resolve::create_transform_registry(&config);
    let mut ok = true;

    match validator::validate_transform_refs(&config, &registry.names()) {
        Ok(()) => println!("Transforms:        OK"),
        Err(e) => {
            ok = false;
            println!("Transforms:        FAILED");
            println!("  {e}");
        }
    }

    match resolve::create_manifest_table(&config) {
        Ok(_) => println!("Manifest table:    OK"),
        Err(e) => {
            ok = false;
            println!("Manifest table:    FAILED");
            println!("  {e:#}");
        }
    }

    match resolve::create_ledgers(&config) {
        Ok(ledgers) => {
            for env in ledgers.environments() {
                println!("{:18} OK", format!("Ledger [{env}]:"));
            }
        }
        Err(e) => {
            ok = false;
            println!("Ledgers:           FAILED");
            println!("  {e:#}");
        }
    }

    if ok {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}
