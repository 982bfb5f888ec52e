use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric name to value, e.g. `{"loss": 0.31, "accuracy": 0.88}`.
pub type Logs = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitConfig {
    pub batch_size: usize,
    pub epochs: usize,
    pub shuffle: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self { batch_size: 32, epochs: 1, shuffle: true }
    }
}

/// Per-epoch logs collected by a fit run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<Logs>,
    /// Batches completed across all epochs.
    pub steps: u64,
}

impl History {
    #[must_use]
    pub fn last(&self) -> Option<&Logs> {
        self.epochs.last()
    }
}

/// Lifecycle hooks invoked by [`CompiledModel::fit`](crate::CompiledModel::fit).
///
/// Returning an error from any hook stops training and surfaces that error.
pub trait FitCallbacks {
    fn on_train_begin(&mut self) -> EngineResult<()> {
        Ok(())
    }

    /// `step` counts batches across the whole run and never repeats.
    fn on_batch_end(&mut self, _epoch: usize, _step: u64, _logs: &Logs) -> EngineResult<()> {
        Ok(())
    }

    fn on_epoch_end(&mut self, _epoch: usize, _logs: &Logs) -> EngineResult<()> {
        Ok(())
    }

    fn on_train_end(&mut self, _history: &History) -> EngineResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopCallbacks;

impl FitCallbacks for NoopCallbacks {}
