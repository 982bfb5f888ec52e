//! Run coordination: check a container's preconditions, persist the run
//! options, then train each bound model.
//!
//! Precondition failures abort the run. Everything after that is isolated
//! per model and reported as a [`ModelOutcome`].

use crate::config::TrainingConfig;
use crate::dataset::Dataset;
use crate::error::{PreconditionError, TrainingError, TrainingResult};
use crate::ids::{ContainerId, ModelId};
use crate::job::TrainingJob;
use crate::options::CompileOptions;
use crate::progress::{FanoutProgressSink, ProgressSink, StoreProgressSink};
use crate::store::RunStore;
use crate::trainer::{ModelTrainer, TrainingReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Succeeded { model_id: ModelId, report: TrainingReport },
    Failed { model_id: ModelId, error: String },
    Skipped { model_id: ModelId, reason: String },
}

impl ModelOutcome {
    #[must_use]
    pub fn model_id(&self) -> &ModelId {
        match self {
            Self::Succeeded { model_id, .. }
            | Self::Failed { model_id, .. }
            | Self::Skipped { model_id, .. } => model_id,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Per-model outcomes of one run, in the container's model order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub container_id: ContainerId,
    pub options: CompileOptions,
    pub outcomes: Vec<ModelOutcome>,
}

impl RunReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o, ModelOutcome::Failed { .. })).count()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o, ModelOutcome::Skipped { .. })).count()
    }
}

/// Shared state for the models of one run.
struct RunContext {
    store: Arc<dyn RunStore>,
    trainer: Arc<dyn ModelTrainer>,
    config: TrainingConfig,
    container_id: ContainerId,
    options: CompileOptions,
    dataset: Arc<Dataset>,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl RunContext {
    async fn train_model(&self, model_id: ModelId) -> ModelOutcome {
        if self.cancel.is_cancelled() {
            return ModelOutcome::Skipped { model_id, reason: "run cancelled".to_string() };
        }

        let model = match self.store.get_model(&model_id).await {
            Ok(Some(model)) => model,
            Ok(None) => {
                let reason = TrainingError::UnresolvedModel(model_id.clone()).to_string();
                warn!(
                    container_id = %self.container_id,
                    model_id = %model_id,
                    "model not found, skipping"
                );
                return ModelOutcome::Skipped { model_id, reason };
            }
            Err(e) => {
                error!(model_id = %model_id, error = %e, "model lookup failed");
                return ModelOutcome::Failed { model_id, error: e.to_string() };
            }
        };

        let job =
            TrainingJob::new(self.container_id.clone(), model_id.clone(), self.options.clone())
                .with_holdout(self.config.evaluate_holdout);
        let token = self.cancel.child_token();
        let (dataset, sink) = (self.dataset.clone(), self.sink.clone());
        let mut training = self.trainer.train(&job, &model, dataset, sink, token.clone());

        let result = match self.config.model_timeout() {
            Some(limit) => tokio::select! {
                result = &mut training => result,
                () = tokio::time::sleep(limit) => {
                    token.cancel();
                    let _ = self.trainer.cancel(&job.job_id).await;
                    // The trainer finishes its in-flight writes before the
                    // outcome is reported.
                    if let Err(e) = training.await {
                        debug!(model_id = %model_id, error = %e, "timed-out training stopped");
                    }
                    Err(TrainingError::Timeout(limit))
                }
            },
            None => training.await,
        };

        match result {
            Ok(report) => ModelOutcome::Succeeded { model_id, report },
            Err(e) => {
                error!(
                    container_id = %self.container_id,
                    model_id = %model_id,
                    error = %e,
                    "model training failed"
                );
                ModelOutcome::Failed { model_id, error: e.to_string() }
            }
        }
    }
}

pub struct RunCoordinator {
    store: Arc<dyn RunStore>,
    trainer: Arc<dyn ModelTrainer>,
    config: TrainingConfig,
    observer: Option<Arc<dyn ProgressSink>>,
}

impl RunCoordinator {
    #[must_use]
    pub fn new(
        store: Arc<dyn RunStore>,
        trainer: Arc<dyn ModelTrainer>,
        config: TrainingConfig,
    ) -> Self {
        Self { store, trainer, config, observer: None }
    }

    /// Also sends every progress event to `observer`, after the store write.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressSink>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub async fn run_container(
        &self,
        id: &ContainerId,
        options: &CompileOptions,
    ) -> TrainingResult<RunReport> {
        self.run_container_with_cancel(id, options, CancellationToken::new()).await
    }

    /// Runs every model bound to container `id`.
    ///
    /// Fails without writing anything if the container, its dataset binding,
    /// or its model list is missing, or if `options` is invalid. The options
    /// are saved before the dataset is resolved.
    pub async fn run_container_with_cancel(
        &self,
        id: &ContainerId,
        options: &CompileOptions,
        cancel: CancellationToken,
    ) -> TrainingResult<RunReport> {
        info!(container_id = %id, "run requested");
        let container = self
            .store
            .get_internal_container(id)
            .await?
            .ok_or(PreconditionError::ContainerNotFound)?;
        let dataset_id = container.dataset.clone().ok_or(PreconditionError::NoDataset)?;
        if container.models.is_empty() {
            return Err(PreconditionError::NoModels.into());
        }
        options.validate()?;
        self.config.validate()?;

        self.store.save_container_options(id, options).await?;

        let unresolved = PreconditionError::DatasetUnresolved;
        let record = self.store.get_set(&dataset_id).await?.ok_or(unresolved.clone())?;
        let dataref = self.store.get_ref(&record.dataref).await?.ok_or(unresolved)?;

        let ctx = Arc::new(RunContext {
            store: self.store.clone(),
            trainer: self.trainer.clone(),
            config: self.config.clone(),
            container_id: id.clone(),
            options: options.clone(),
            dataset: Arc::new(dataref.data),
            sink: self.progress_sink(),
            cancel,
        });

        info!(
            container_id = %id,
            trainer = self.trainer.id(),
            models = container.models.len(),
            rows = ctx.dataset.len(),
            parallel = self.config.max_parallel_models,
            "training models"
        );
        let outcomes = if self.config.max_parallel_models <= 1 {
            let mut outcomes = Vec::with_capacity(container.models.len());
            for model_id in container.models {
                outcomes.push(ctx.train_model(model_id).await);
            }
            outcomes
        } else {
            Self::train_parallel(ctx, container.models, self.config.max_parallel_models).await
        };

        let report = RunReport { container_id: id.clone(), options: options.clone(), outcomes };
        info!(
            container_id = %id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "run finished"
        );
        Ok(report)
    }

    fn progress_sink(&self) -> Arc<dyn ProgressSink> {
        let store_sink: Arc<dyn ProgressSink> =
            Arc::new(StoreProgressSink::new(self.store.clone(), self.config.store_write_retries));
        match &self.observer {
            Some(observer) => Arc::new(FanoutProgressSink::new(vec![store_sink, observer.clone()])),
            None => store_sink,
        }
    }

    async fn train_parallel(
        ctx: Arc<RunContext>,
        models: Vec<ModelId>,
        limit: usize,
    ) -> Vec<ModelOutcome> {
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut handles = Vec::with_capacity(models.len());

        for model_id in models {
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();
            let fallback = model_id.clone();
            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => return ModelOutcome::Failed { model_id, error: e.to_string() },
                };
                ctx.train_model(model_id).await
            });
            handles.push((fallback, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (model_id, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|e| {
                error!(model_id = %model_id, "training task failed: {}", e);
                ModelOutcome::Failed { model_id, error: format!("training task failed: {e}") }
            });
            outcomes.push(outcome);
        }
        outcomes
    }
}
