use crate::error::{TrainingError, TrainingResult};
use crate::partition::SplitPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime knobs for a run. Every field has a default, so a partial TOML
/// `[training]` table is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub split: SplitPolicy,
    /// Models trained at once. `1` trains them one after another.
    pub max_parallel_models: usize,
    pub model_timeout_ms: Option<u64>,
    /// Wait for each batch's store write before computing the next batch.
    pub flush_each_batch: bool,
    pub progress_buffer: usize,
    pub store_write_retries: u32,
    pub seed: Option<u64>,
    pub evaluate_holdout: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            split: SplitPolicy::default(),
            max_parallel_models: 1,
            model_timeout_ms: None,
            flush_each_batch: true,
            progress_buffer: 32,
            store_write_retries: 2,
            seed: None,
            evaluate_holdout: false,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> TrainingResult<()> {
        self.split.validate()?;
        if self.max_parallel_models == 0 {
            let reason = "max_parallel_models must be >= 1".to_string();
            return Err(TrainingError::InvalidSpec(reason));
        }
        if self.progress_buffer == 0 {
            return Err(TrainingError::InvalidSpec("progress_buffer must be >= 1".to_string()));
        }
        if self.model_timeout_ms == Some(0) {
            return Err(TrainingError::InvalidSpec("model_timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn model_timeout(&self) -> Option<Duration> {
        self.model_timeout_ms.map(Duration::from_millis)
    }
}
