//! `run` command: train a container's models.

use super::open_store;
use crate::config::StrataConfig;
use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use strata_training::{
    CompileOptions, ContainerId, ModelOutcome, RunCoordinator, RunReport, StdoutProgressSink,
    TrainingOrchestrator, format_logs,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Container id
    pub container: String,

    /// Rows per batch (default 5)
    #[arg(long)]
    pub batch_size: Option<u32>,

    /// Passes over the training rows (default 5)
    #[arg(long)]
    pub epochs: Option<u32>,

    /// Loss identifier (see `strata-cli options`)
    #[arg(long)]
    pub loss: Option<String>,

    /// Metric identifier (see `strata-cli options`)
    #[arg(long)]
    pub metrics: Option<String>,

    /// Models to train at once
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Per-model time limit in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Evaluate each model on the held-out rows after training
    #[arg(long)]
    pub evaluate: bool,

    /// Seed for weight init, shuffling and dropout
    #[arg(long)]
    pub seed: Option<u64>,

    /// Do not print per-batch progress
    #[arg(short, long)]
    pub quiet: bool,

    /// Output the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    fn options(&self, config: &StrataConfig) -> CompileOptions {
        let mut options = config.defaults.to_options();
        if let Some(batch_size) = self.batch_size {
            options.batch_size = batch_size;
        }
        if let Some(epochs) = self.epochs {
            options.epochs = epochs;
        }
        if let Some(ref loss) = self.loss {
            options.loss = loss.clone();
        }
        if let Some(ref metrics) = self.metrics {
            options.metrics = metrics.clone();
        }
        options
    }
}

pub async fn execute(config: &StrataConfig, store: Option<PathBuf>, args: RunArgs) -> Result<()> {
    let store = Arc::new(open_store(store).await?);
    let options = args.options(config);

    let mut training = config.training();
    if let Some(parallel) = args.parallel {
        training.max_parallel_models = parallel;
    }
    if args.timeout_ms.is_some() {
        training.model_timeout_ms = args.timeout_ms;
    }
    if args.seed.is_some() {
        training.seed = args.seed;
    }
    training.evaluate_holdout |= args.evaluate;

    let trainer = Arc::new(TrainingOrchestrator::new(training.clone()));
    let mut coordinator = RunCoordinator::new(store, trainer, training);
    if !args.quiet && !args.json {
        coordinator = coordinator.with_observer(Arc::new(StdoutProgressSink));
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current batch");
            on_interrupt.cancel();
        }
    });

    let container = ContainerId::new(args.container);
    let report = coordinator.run_container_with_cancel(&container, &options, cancel).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.failed() > 0 {
        bail!("{} of {} models failed", report.failed(), report.outcomes.len());
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let options = &report.options;
    println!();
    println!(
        "{}",
        format!(
            "Run {} (batchSize={}, epochs={}, loss={}, metrics={})",
            report.container_id, options.batch_size, options.epochs, options.loss, options.metrics
        )
        .bold()
    );
    for outcome in &report.outcomes {
        match outcome {
            ModelOutcome::Succeeded { model_id, report } => {
                let last = report.history.last().map(format_logs).unwrap_or_default();
                println!(
                    "  {} {:<20} {} batches  {}",
                    "✓".green(),
                    model_id.as_str(),
                    report.batches_reported,
                    last.dimmed()
                );
                for warning in &report.warnings {
                    println!("      {} layer {}: {}", "!".yellow(), warning.index, warning.message);
                }
                if let Some(holdout) = &report.holdout {
                    println!("      held-out: {}", format_logs(holdout));
                }
            }
            ModelOutcome::Failed { model_id, error } => {
                println!("  {} {:<20} {}", "✗".red(), model_id.as_str(), error.red());
            }
            ModelOutcome::Skipped { model_id, reason } => {
                println!("  {} {:<20} {}", "-".yellow(), model_id.as_str(), reason.dimmed());
            }
        }
    }
    println!(
        "{} succeeded, {} failed, {} skipped",
        report.succeeded(),
        report.failed(),
        report.skipped()
    );
}
