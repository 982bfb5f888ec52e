use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use strata_engine::{EngineError, Loss, Metric};

/// Hyperparameters requested for a run, persisted on the container.
///
/// `loss` and `metrics` stay as identifiers so the requested configuration
/// can be stored verbatim; they are checked against the closed enumerations
/// when a model is compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    pub batch_size: u32,
    pub epochs: u32,
    pub loss: String,
    pub metrics: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            epochs: 5,
            loss: Loss::MeanSquaredError.as_str().to_string(),
            metrics: Metric::Accuracy.as_str().to_string(),
        }
    }
}

impl CompileOptions {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidSpec("batchSize must be >= 1".to_string()));
        }
        if self.epochs == 0 {
            return Err(TrainingError::InvalidSpec("epochs must be >= 1".to_string()));
        }
        Ok(())
    }

    pub fn loss_id(&self) -> TrainingResult<Loss> {
        self.loss.parse().map_err(|e: EngineError| TrainingError::Compile(e.to_string()))
    }

    pub fn metric_id(&self) -> TrainingResult<Metric> {
        self.metrics.parse().map_err(|e: EngineError| TrainingError::Compile(e.to_string()))
    }
}
