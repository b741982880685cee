use std::path::Path;

use anyhow::{Context, Result};
use stagerun_engine::resolve;
use stagerun_engine::StageError;
use stagerun_types::event::InvocationMeta;

/// Execute the `invoke` command: run one stage for the event in `event_path`.
pub async fn execute(config_path: &Path, event_path: &Path, function_name: &str) -> Result<()> {
    let config = super::load_config(config_path)?;

    let raw = std::fs::read_to_string(event_path)
        .with_context(|| format!("Failed to read event file: {}", event_path.display()))?;
    let event: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Event file is not valid JSON: {}", event_path.display()))?;

    let controller = resolve::create_controller(&config)?;
    let meta = InvocationMeta::new(function_name);

    tracing::debug!(
        event = %event_path.display(),
        function_name,
        "Invoking stage"
    );

    let result = tokio::task::spawn_blocking(move || controller.execute_value(&event, &meta))
        .await
        .context("Stage task panicked")?;

    match result {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(err) => {
            report_failure(&err);
            Err(err.into())
        }
    }
}

fn report_failure(err: &StageError) {
    match err {
        StageError::Precondition(_) => {
            eprintln!("Stage not started; no status was recorded.");
        }
        StageError::Failed { compensation, .. } => {
            eprintln!("Stage failed; run and manifest marked FAILED.");
            for failure in compensation {
                eprintln!("  warning: {failure}");
            }
        }
    }
}
