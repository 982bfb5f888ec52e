//! `inspect` command: what a run of a container would train on.

use super::open_store;
use crate::config::StrataConfig;
use anyhow::Result;
use colored::Colorize;
use serde_json::{Value, json};
use std::path::PathBuf;
use strata_training::{
    ContainerId, ModelBuilder, PreconditionError, StoreDocument, TrainingConfig, partition,
};

pub async fn execute(
    config: &StrataConfig,
    store: Option<PathBuf>,
    container: &str,
    json_output: bool,
) -> Result<()> {
    let doc = open_store(store).await?.snapshot().await;
    let value = describe(&doc, &ContainerId::new(container), &config.training())?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_description(&value);
    }
    Ok(())
}

/// Builds a JSON description of the container and everything it binds.
fn describe(doc: &StoreDocument, id: &ContainerId, training: &TrainingConfig) -> Result<Value> {
    let container = doc.container(id).ok_or(PreconditionError::ContainerNotFound)?;

    let dataset = container
        .dataset
        .as_ref()
        .and_then(|dataset_id| doc.dataset(dataset_id))
        .and_then(|record| doc.dataref(&record.dataref).map(|dataref| (record, &dataref.data)));
    let dataset = match (&container.dataset, dataset) {
        (None, _) => json!({ "error": PreconditionError::NoDataset.to_string() }),
        (Some(_), None) => json!({ "error": PreconditionError::DatasetUnresolved.to_string() }),
        (Some(_), Some((record, data))) => {
            let partitions = match data.validate().and_then(|()| partition(data, &training.split)) {
                Ok(parts) => json!(parts.sizes()),
                Err(e) => json!({ "error": e.to_string() }),
            };
            json!({
                "id": record.id,
                "name": record.name,
                "rows": data.len(),
                "xshape": data.xshape,
                "yshape": data.yshape,
                "partitions": partitions,
            })
        }
    };

    let builder = ModelBuilder::new();
    let models: Vec<Value> = container
        .models
        .iter()
        .map(|model_id| {
            let Some(model) = doc.model(model_id) else {
                return json!({ "id": model_id, "error": "model not found" });
            };
            match builder.build(&model.layers) {
                Ok(built) => json!({
                    "id": model.id,
                    "name": model.name,
                    "layers": built.graph.layers().iter().map(|l| l.describe()).collect::<Vec<_>>(),
                    "warnings": built.warnings,
                    "latest_batch": model.logs.as_ref().map(|l| l.batch_index),
                }),
                Err(e) => json!({ "id": model.id, "name": model.name, "error": e.to_string() }),
            }
        })
        .collect();

    Ok(json!({
        "id": container.id,
        "name": container.name,
        "compile_options": container.compile_options,
        "dataset": dataset,
        "models": models,
    }))
}

fn print_description(value: &Value) {
    let text = |v: &Value| v.as_str().map_or_else(|| v.to_string(), str::to_string);

    println!("{} {}", "Container".bold(), text(&value["id"]).cyan());
    if let Some(options) = value["compile_options"].as_object() {
        let opts: Vec<String> = options.iter().map(|(k, v)| format!("{k}={}", text(v))).collect();
        println!("  options:    {}", opts.join(" "));
    }

    let dataset = &value["dataset"];
    if let Some(error) = dataset["error"].as_str() {
        println!("  dataset:    {}", error.red());
    } else {
        println!(
            "  dataset:    {} ({} rows, x {}, y {})",
            text(&dataset["id"]),
            dataset["rows"],
            dataset["xshape"],
            dataset["yshape"]
        );
        let parts = &dataset["partitions"];
        if let Some(error) = parts["error"].as_str() {
            println!("  partitions: {}", error.red());
        } else {
            println!(
                "  partitions: train {} / validation {} / test {}",
                parts["train"], parts["validation"], parts["test"]
            );
        }
    }

    let models = value["models"].as_array().cloned().unwrap_or_default();
    println!("  models:     {}", models.len());
    for model in &models {
        println!("    {}", text(&model["id"]).bold());
        if let Some(error) = model["error"].as_str() {
            println!("      {}", error.red());
            continue;
        }
        for layer in model["layers"].as_array().into_iter().flatten() {
            println!("      {}", text(layer));
        }
        for warning in model["warnings"].as_array().into_iter().flatten() {
            println!("      {} {}", "skipped:".yellow(), text(&warning["message"]));
        }
    }
}
