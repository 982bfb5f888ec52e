use crate::ids::ModelId;
use crate::registry::InvalidParameters;
use std::time::Duration;
use strata_engine::EngineError;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

/// Missing prerequisites for a run. Fatal to the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("No container found")]
    ContainerNotFound,

    #[error("No dataset found")]
    NoDataset,

    #[error("No models found")]
    NoModels,

    /// The dataset record, or the raw data it points at, is missing.
    #[error("Nop dataset found")]
    DatasetUnresolved,
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("invalid run options: {0}")]
    InvalidSpec(String),

    #[error("model not found: {0}")]
    UnresolvedModel(ModelId),

    #[error("layer {index}: {source}")]
    InvalidLayer {
        index: usize,
        #[source]
        source: InvalidParameters,
    },

    #[error("compile error: {0}")]
    Compile(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("backend error: {0}")]
    Backend(#[source] EngineError),

    #[error("store error: {0}")]
    Store(String),

    #[error("training cancelled")]
    Cancelled,

    #[error("training timed out after {0:?}")]
    Timeout(Duration),

    #[error("trainer error: {0}")]
    Trainer(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TrainingError {
    /// Whether the error stops the whole run rather than a single model.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_messages_are_user_facing() {
        let cases = [
            (PreconditionError::ContainerNotFound, "No container found"),
            (PreconditionError::NoDataset, "No dataset found"),
            (PreconditionError::NoModels, "No models found"),
            (PreconditionError::DatasetUnresolved, "Nop dataset found"),
        ];
        for (err, message) in cases {
            let err = TrainingError::from(err);
            assert!(err.is_precondition());
            assert_eq!(err.to_string(), message);
        }
    }
}
