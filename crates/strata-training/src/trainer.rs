use crate::builder::BuildWarning;
use crate::dataset::Dataset;
use crate::error::TrainingResult;
use crate::ids::ModelId;
use crate::job::{TrainingJob, TrainingJobId};
use crate::model::ModelRecord;
use crate::partition::PartitionSizes;
use crate::progress::ProgressSink;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strata_engine::{History, Logs};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainerStatus {
    Idle,
    Preparing,
    Running,
    Finished,
    Failed(String),
    Cancelled,
}

/// Outcome of one model's successful training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub job_id: TrainingJobId,
    pub model_id: ModelId,
    pub layer_count: usize,
    pub warnings: Vec<BuildWarning>,
    pub partitions: PartitionSizes,
    pub history: History,
    pub batches_reported: u64,
    /// Loss and metric on the held-out rows, when requested.
    pub holdout: Option<Logs>,
}

/// Trains one model against one dataset.
#[async_trait]
pub trait ModelTrainer: Send + Sync {
    fn id(&self) -> &'static str;

    async fn train(
        &self,
        job: &TrainingJob,
        model: &ModelRecord,
        dataset: Arc<Dataset>,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> TrainingResult<TrainingReport>;

    async fn status(&self, job_id: &TrainingJobId) -> TrainingResult<TrainerStatus>;

    async fn cancel(&self, job_id: &TrainingJobId) -> TrainingResult<()>;
}
