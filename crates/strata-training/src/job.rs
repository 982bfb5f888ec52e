use crate::error::{TrainingError, TrainingResult};
use crate::ids::{ContainerId, ModelId};
use crate::options::CompileOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one model's training job within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingJobId(pub String);

impl TrainingJobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TrainingJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrainingJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingJob {
    pub job_id: TrainingJobId,
    pub created_at: DateTime<Utc>,
    pub container_id: ContainerId,
    pub model_id: ModelId,
    pub options: CompileOptions,
    /// Evaluate the held-out test rows once fitting finishes.
    #[serde(default)]
    pub evaluate_holdout: bool,
}

impl TrainingJob {
    #[must_use]
    pub fn new(container_id: ContainerId, model_id: ModelId, options: CompileOptions) -> Self {
        Self {
            job_id: TrainingJobId::new(),
            created_at: Utc::now(),
            container_id,
            model_id,
            options,
            evaluate_holdout: false,
        }
    }

    #[must_use]
    pub fn with_holdout(mut self, evaluate_holdout: bool) -> Self {
        self.evaluate_holdout = evaluate_holdout;
        self
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.model_id.as_str().trim().is_empty() {
            return Err(TrainingError::InvalidSpec("model_id is required".to_string()));
        }
        self.options.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_validate_requires_model_and_positive_options() {
        let job = TrainingJob::new("c1".into(), "".into(), CompileOptions::default());
        assert!(job.validate().is_err());

        let mut job = TrainingJob::new("c1".into(), "m1".into(), CompileOptions::default());
        assert!(job.validate().is_ok());
        job.options.epochs = 0;
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_job_ids_are_unique() {
        assert_ne!(TrainingJobId::new(), TrainingJobId::new());
    }
}
