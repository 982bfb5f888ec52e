//! Command implementations.

pub mod inspect;
pub mod logs;
pub mod options;
pub mod run;

use anyhow::{Context, Result};
use std::path::PathBuf;
use strata_training::JsonFileStore;

/// Opens the store named by `--store`, `STRATA_STORE` or the config file.
pub async fn open_store(path: Option<PathBuf>) -> Result<JsonFileStore> {
    let path = path.context(
        "No store configured: pass --store, set STRATA_STORE, or add `store` to .stratarc",
    )?;
    JsonFileStore::open(&path)
        .await
        .with_context(|| format!("Failed to open store {}", path.display()))
}
