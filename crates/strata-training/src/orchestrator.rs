//! Per-model training: build, compile, partition, fit, report.
//!
//! The fit loop is synchronous and runs on a blocking thread. Progress
//! leaves it through a bounded channel; a consumer task performs the sink
//! writes. With `flush_each_batch` set, each batch waits for its write to be
//! acknowledged before the next batch is computed.

use crate::builder::ModelBuilder;
use crate::config::TrainingConfig;
use crate::dataset::Dataset;
use crate::error::{TrainingError, TrainingResult};
use crate::ids::ModelId;
use crate::job::{TrainingJob, TrainingJobId};
use crate::model::ModelRecord;
use crate::partition::{TensorSet, partition};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::trainer::{ModelTrainer, TrainerStatus, TrainingReport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use strata_engine::{
    CompiledModel, EngineError, EngineResult, FitCallbacks, FitConfig, History, Logs,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Ack = oneshot::Sender<TrainingResult<()>>;

#[derive(Debug)]
struct ProgressMessage {
    event: ProgressEvent,
    ack: Option<Ack>,
}

/// Writes every queued event to `sink`.
///
/// Acknowledged events hand the write result back to the fit thread. An
/// unacknowledged event that fails ends the drain; the fit thread notices
/// the closed channel on its next send.
async fn drain_progress(
    mut rx: mpsc::Receiver<ProgressMessage>,
    sink: Arc<dyn ProgressSink>,
) -> TrainingResult<()> {
    while let Some(ProgressMessage { event, ack }) = rx.recv().await {
        let result = sink.report(&event).await;
        match ack {
            Some(ack) => {
                let _ = ack.send(result);
            }
            None => result?,
        }
    }
    Ok(())
}

struct ChannelCallbacks {
    model_id: ModelId,
    tx: mpsc::Sender<ProgressMessage>,
    cancel: CancellationToken,
    flush_each_batch: bool,
    reported: u64,
    failure: Option<TrainingError>,
}

impl ChannelCallbacks {
    fn check_cancelled(&self) -> EngineResult<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Stopped("cancelled".to_string()));
        }
        Ok(())
    }

    fn send(&mut self, event: ProgressEvent, wait: bool) -> EngineResult<()> {
        let closed = || EngineError::Stopped("progress consumer stopped".to_string());
        if !wait {
            let message = ProgressMessage { event, ack: None };
            return self.tx.blocking_send(message).map_err(|_| closed());
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .blocking_send(ProgressMessage { event, ack: Some(ack_tx) })
            .map_err(|_| closed())?;
        match ack_rx.blocking_recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                let stopped = EngineError::Stopped(e.to_string());
                self.failure = Some(e);
                Err(stopped)
            }
            Err(_) => Err(closed()),
        }
    }
}

impl FitCallbacks for ChannelCallbacks {
    fn on_train_begin(&mut self) -> EngineResult<()> {
        debug!(model_id = %self.model_id, "train begin");
        self.check_cancelled()
    }

    /// The completed batch is always reported before cancellation is
    /// honoured.
    fn on_batch_end(&mut self, epoch: usize, step: u64, logs: &Logs) -> EngineResult<()> {
        let event = ProgressEvent::Batch {
            model_id: self.model_id.clone(),
            epoch,
            batch_index: step,
            logs: logs.clone(),
        };
        self.send(event, self.flush_each_batch)?;
        self.reported += 1;
        self.check_cancelled()
    }

    fn on_epoch_end(&mut self, epoch: usize, logs: &Logs) -> EngineResult<()> {
        let model_id = self.model_id.clone();
        self.send(ProgressEvent::Epoch { model_id, epoch, logs: logs.clone() }, false)
    }

    fn on_train_end(&mut self, history: &History) -> EngineResult<()> {
        debug!(model_id = %self.model_id, steps = history.steps, "train end");
        Ok(())
    }
}

struct FitOutcome {
    result: EngineResult<History>,
    holdout: Option<TrainingResult<Logs>>,
    reported: u64,
    failure: Option<TrainingError>,
}

/// Keeps a job's cancellation token reachable from [`ModelTrainer::cancel`]
/// until `train` returns or its future is dropped.
struct TokenRegistration<'a> {
    tokens: &'a Mutex<HashMap<String, CancellationToken>>,
    job_id: String,
}

impl<'a> TokenRegistration<'a> {
    fn new(
        tokens: &'a Mutex<HashMap<String, CancellationToken>>,
        job_id: &TrainingJobId,
        token: CancellationToken,
    ) -> Self {
        if let Ok(mut t) = tokens.lock() {
            t.insert(job_id.0.clone(), token);
        }
        Self { tokens, job_id: job_id.0.clone() }
    }
}

impl Drop for TokenRegistration<'_> {
    fn drop(&mut self) {
        if let Ok(mut t) = self.tokens.lock() {
            t.remove(&self.job_id);
        }
    }
}

/// Trains models in-process on the engine backend.
pub struct TrainingOrchestrator {
    config: TrainingConfig,
    builder: ModelBuilder,
    statuses: Arc<Mutex<HashMap<String, TrainerStatus>>>,
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl TrainingOrchestrator {
    #[must_use]
    pub fn new(config: TrainingConfig) -> Self {
        let builder = ModelBuilder::new().with_seed(config.seed);
        Self {
            config,
            builder,
            statuses: Arc::new(Mutex::new(HashMap::new())),
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Jobs currently holding a cancellation token.
    #[must_use]
    pub fn active_jobs(&self) -> usize {
        self.tokens.lock().map_or(0, |t| t.len())
    }

    /// Loss and metric of `model` on the held-out test rows.
    pub fn evaluate_holdout(model: &mut CompiledModel, test: &TensorSet) -> TrainingResult<Logs> {
        if test.x.is_empty() {
            return Err(TrainingError::Dataset("no held-out rows to evaluate".to_string()));
        }
        model.evaluate(&test.x, &test.y).map_err(TrainingError::Backend)
    }

    fn set_status(&self, job_id: &TrainingJobId, status: TrainerStatus) {
        if let Ok(mut s) = self.statuses.lock() {
            s.insert(job_id.0.clone(), status);
        }
    }

    async fn run_job(
        &self,
        job: &TrainingJob,
        model: &ModelRecord,
        dataset: Arc<Dataset>,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> TrainingResult<TrainingReport> {
        job.validate()?;
        let (job_id, model_id) = (job.job_id.clone(), model.id.clone());
        progress.report(&ProgressEvent::Started { job_id, model_id }).await?;

        let built = self.builder.build(&model.layers)?;
        for warning in &built.warnings {
            warn!(
                model_id = %model.id,
                index = warning.index,
                layer = %warning.layer,
                "{}",
                warning.message
            );
        }
        let layer_count = built.graph.len();
        let mut compiled = self.builder.compile(built.graph, &job.options)?;

        dataset.validate()?;
        let partitions = partition(&dataset, &self.config.split)?;
        let sizes = partitions.sizes();
        let train = partitions.train.tensors()?;
        let validation = partitions.validation.tensors()?;
        let holdout_set = if job.evaluate_holdout || self.config.evaluate_holdout {
            Some(partitions.test.tensors()?)
        } else {
            None
        };

        let fit_config = FitConfig {
            batch_size: job.options.batch_size as usize,
            epochs: job.options.epochs as usize,
            shuffle: true,
        };
        info!(
            model_id = %model.id,
            layers = layer_count,
            train = sizes.train,
            validation = sizes.validation,
            batch_size = fit_config.batch_size,
            epochs = fit_config.epochs,
            "training started"
        );
        self.set_status(&job.job_id, TrainerStatus::Running);

        let (tx, rx) = mpsc::channel(self.config.progress_buffer.max(1));
        let drain = tokio::spawn(drain_progress(rx, progress.clone()));
        // Dropping this future mid-fit cancels the detached fit and drain.
        let stop_detached = cancel.clone().drop_guard();
        let mut callbacks = ChannelCallbacks {
            model_id: model.id.clone(),
            tx,
            cancel: cancel.clone(),
            flush_each_batch: self.config.flush_each_batch,
            reported: 0,
            failure: None,
        };

        let fit = tokio::task::spawn_blocking(move || {
            let result = compiled.fit(
                &train.x,
                &train.y,
                &fit_config,
                Some((&validation.x, &validation.y)),
                &mut callbacks,
            );
            let holdout = match (&result, holdout_set) {
                (Ok(_), Some(test)) if !test.x.is_empty() => {
                    Some(Self::evaluate_holdout(&mut compiled, &test))
                }
                _ => None,
            };
            FitOutcome { result, holdout, reported: callbacks.reported, failure: callbacks.failure }
        });

        let outcome = fit.await;
        let drained = drain.await;
        let _ = stop_detached.disarm();
        let outcome =
            outcome.map_err(|e| TrainingError::Trainer(format!("fit task failed: {e}")))?;
        drained.map_err(|e| TrainingError::Trainer(format!("progress task failed: {e}")))??;

        let history = match outcome.result {
            Ok(history) => history,
            Err(EngineError::Stopped(reason)) => {
                return Err(outcome.failure.unwrap_or_else(|| {
                    if cancel.is_cancelled() {
                        TrainingError::Cancelled
                    } else {
                        TrainingError::Trainer(reason)
                    }
                }));
            }
            Err(e) => return Err(TrainingError::Backend(e)),
        };
        let holdout = outcome.holdout.transpose()?;

        let (job_id, model_id) = (job.job_id.clone(), model.id.clone());
        progress.report(&ProgressEvent::Finished { job_id, model_id }).await?;
        info!(
            model_id = %model.id,
            steps = history.steps,
            reported = outcome.reported,
            "training finished"
        );

        Ok(TrainingReport {
            job_id: job.job_id.clone(),
            model_id: model.id.clone(),
            layer_count,
            warnings: built.warnings,
            partitions: sizes,
            history,
            batches_reported: outcome.reported,
            holdout,
        })
    }
}

#[async_trait]
impl ModelTrainer for TrainingOrchestrator {
    fn id(&self) -> &'static str {
        "strata-engine"
    }

    async fn train(
        &self,
        job: &TrainingJob,
        model: &ModelRecord,
        dataset: Arc<Dataset>,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> TrainingResult<TrainingReport> {
        let job_id = job.job_id.clone();
        self.set_status(&job_id, TrainerStatus::Preparing);
        let registration = TokenRegistration::new(&self.tokens, &job_id, cancel.clone());

        let result = self.run_job(job, model, dataset, progress, cancel).await;

        drop(registration);
        match &result {
            Ok(_) => self.set_status(&job_id, TrainerStatus::Finished),
            Err(TrainingError::Cancelled) => self.set_status(&job_id, TrainerStatus::Cancelled),
            Err(e) => self.set_status(&job_id, TrainerStatus::Failed(e.to_string())),
        }
        result
    }

    async fn status(&self, job_id: &TrainingJobId) -> TrainingResult<TrainerStatus> {
        Ok(self
            .statuses
            .lock()
            .ok()
            .and_then(|s| s.get(&job_id.0).cloned())
            .unwrap_or(TrainerStatus::Idle))
    }

    async fn cancel(&self, job_id: &TrainingJobId) -> TrainingResult<()> {
        if let Some(token) = self.tokens.lock().ok().and_then(|t| t.get(&job_id.0).cloned()) {
            token.cancel();
        }
        self.set_status(job_id, TrainerStatus::Cancelled);
        Ok(())
    }
}
