//! Strata CLI - train the models of a container against a JSON store.
//!
//! The store file holds containers, dataset records, raw data and model
//! definitions; `run` writes the run options and per-batch progress back
//! into it.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{inspect, logs, options, run};
use config::StrataConfig;

#[derive(Parser, Debug)]
#[command(
    name = "strata-cli",
    author,
    version,
    about = "Strata - build and train sequential models from stored definitions"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// JSON store file (overrides STRATA_STORE)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train every model bound to a container
    ///
    /// Saves the options on the container, then trains each model on the
    /// container's dataset, writing the latest batch logs to each model.
    Run(run::RunArgs),

    /// Show a container's dataset, partitions and resolved models
    Inspect {
        /// Container id
        container: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the latest persisted progress of a model
    Logs {
        /// Model id
        model: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List layer kinds, activations, losses and metrics
    Options {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = StrataConfig::discover_and_load()?;

    let level = match config.log_level(args.log_level.as_deref()).as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = config.store_path(args.store.as_deref());

    match args.command {
        Command::Run(run_args) => run::execute(&config, store, run_args).await?,
        Command::Inspect { container, json } => {
            inspect::execute(&config, store, &container, json).await?;
        }
        Command::Logs { model, json } => logs::execute(store, &model, json).await?,
        Command::Options { json } => options::execute(&config, json)?,
    }

    Ok(())
}
