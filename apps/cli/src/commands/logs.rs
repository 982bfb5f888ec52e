//! `logs` command: latest persisted progress of a model.

use super::open_store;
use anyhow::{Result, bail};
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;
use strata_training::{ModelId, RunStore, format_logs};

pub async fn execute(store: Option<PathBuf>, model: &str, json_output: bool) -> Result<()> {
    let store = open_store(store).await?;
    let Some(record) = store.get_model(&ModelId::new(model)).await? else {
        bail!("model not found: {model}");
    };

    if json_output {
        let value = json!({
            "model_id": record.id,
            "name": record.name,
            "logs": record.logs,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{} {}", "Model".bold(), record.id.as_str().cyan());
    match record.logs {
        Some(logs) => {
            println!("  batch:    {}", logs.batch_index);
            println!("  updated:  {}", logs.updated_at.to_rfc3339());
            println!("  logs:     {}", format_logs(&logs.logs));
        }
        None => println!("  {}", "no progress recorded".dimmed()),
    }
    Ok(())
}
