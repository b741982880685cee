use std::path::Path;

use anyhow::{Context, Result};
use stagerun_engine::resolve;
use stagerun_state::ExecutionLedger;
use stagerun_types::ids::{EnvName, RunId};

fn ledger_for(config_path: &Path, env: &str) -> Result<std::sync::Arc<dyn ExecutionLedger>> {
    let config = super::load_config(config_path)?;
    let ledgers = resolve::create_ledgers(&config)?;
    ledgers
        .get(&EnvName::new(env))
        .with_context(|| format!("No ledger configured for environment '{env}'"))
}

/// Execute `runs start`: create a `PENDING` run and print its id.
pub async fn start(config_path: &Path, env: &str, pipeline: &str) -> Result<()> {
    let ledger = ledger_for(config_path, env)?;
    let run_id = ledger.start_run(pipeline, &EnvName::new(env))?;
    tracing::info!(run_id = %run_id, env, pipeline, "Run started");
    println!("{run_id}");
    Ok(())
}

/// Execute `runs show`: print the run and its history.
pub async fn show(config_path: &Path, env: &str, run_id: &str) -> Result<()> {
    let ledger = ledger_for(config_path, env)?;
    let run_id = RunId::new(run_id);
    let Some(run) = ledger.get_run(&run_id)? else {
        anyhow::bail!("Run '{run_id}' not found in environment '{env}'");
    };

    println!("Run:        {}", run.id);
    println!("Pipeline:   {}", run.pipeline);
    println!("Status:     {}", run.status);
    println!("Started:    {}", run.started_at);
    if let Some(ended) = &run.ended_at {
        println!("Ended:      {ended}");
    }
    if let Some(comment) = &run.issue_comment {
        println!("Issue:      {comment}");
    }

    println!("\nHistory:");
    for event in ledger.history(&run_id)? {
        println!(
            "  {:>3}  {}  {:10}  {}",
            event.seq,
            event.recorded_at,
            event.status.as_str(),
            event.message.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
