//! `options` command: identifiers accepted in model definitions and runs.

use crate::config::StrataConfig;
use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use strata_engine::{Activation, Loss, Metric};
use strata_training::LayerKind;

pub fn execute(config: &StrataConfig, json_output: bool) -> Result<()> {
    let layers: Vec<_> = LayerKind::ALL.iter().map(|k| k.as_str()).collect();
    let activations: Vec<_> = Activation::ALL.iter().map(|a| a.as_str()).collect();
    let losses: Vec<_> = Loss::ALL.iter().map(|l| l.as_str()).collect();
    let metrics: Vec<_> = Metric::ALL.iter().map(|m| m.as_str()).collect();
    let defaults = config.defaults.to_options();

    if json_output {
        let value = json!({
            "layers": layers,
            "activations": activations,
            "losses": losses,
            "metrics": metrics,
            "defaults": defaults,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let section = |title: &str, items: &[&str]| {
        println!("{}", format!("{title} ({})", items.len()).bold());
        for item in items {
            println!("  {item}");
        }
        println!();
    };
    section("Layers", &layers);
    section("Activations", &activations);
    section("Losses", &losses);
    section("Metrics", &metrics);
    println!(
        "{} batchSize={} epochs={} loss={} metrics={}",
        "Defaults".bold(),
        defaults.batch_size,
        defaults.epochs,
        defaults.loss.cyan(),
        defaults.metrics.cyan()
    );
    Ok(())
}
