//! Run coordinator scenarios against the in-memory store.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata_training::{
    CompileOptions, Container, DataRef, Dataset, DatasetRecord, LayerSpec, MemoryStore,
    ModelOutcome, ModelRecord, ModelTrainer, PreconditionError, ProgressEvent, ProgressSink,
    RunCoordinator, StoreDocument, StoreWrite, TrainerStatus, TrainingConfig, TrainingError,
    TrainingJob, TrainingJobId, TrainingOrchestrator, TrainingReport, TrainingResult,
};
use tokio_util::sync::CancellationToken;

fn rows(n: usize) -> Dataset {
    let x: Vec<Vec<f32>> =
        (0..n).map(|i| vec![(i % 20) as f32 / 20.0, ((i * 7) % 11) as f32 / 11.0]).collect();
    let y: Vec<Vec<f32>> =
        x.iter().map(|r| vec![if r[0] + r[1] > 1.0 { 1.0 } else { 0.0 }]).collect();
    Dataset::new(x, y)
}

fn mlp(id: &str) -> ModelRecord {
    ModelRecord::new(
        id,
        vec![
            LayerSpec::new("dense")
                .with_param("units", 4)
                .with_param("activation", "relu")
                .with_param("inputShape", vec![2]),
            LayerSpec::new("dense").with_param("units", 1).with_param("activation", "sigmoid"),
        ],
    )
}

/// A container `c1` bound to dataset `d1` and `bound` model ids.
fn document(models: Vec<ModelRecord>, bound: &[&str], n: usize) -> StoreDocument {
    let mut doc = StoreDocument::default();
    let container = Container::new("c1").with_dataset("d1").with_models(bound.iter().copied());
    doc.upsert_container(container);
    let name = "points".to_string();
    doc.upsert_dataset(DatasetRecord { id: "d1".into(), name, dataref: "r1".into() });
    doc.upsert_dataref(DataRef { id: "r1".into(), data: rows(n) });
    for model in models {
        doc.upsert_model(model);
    }
    doc
}

fn seeded() -> TrainingConfig {
    TrainingConfig { seed: Some(11), ..TrainingConfig::default() }
}

/// Records which models it was asked to train and how many ran at once.
#[derive(Default)]
struct MockTrainer {
    trained: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl MockTrainer {
    fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    fn trained(&self) -> Vec<String> {
        self.trained.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelTrainer for MockTrainer {
    fn id(&self) -> &'static str {
        "mock"
    }

    async fn train(
        &self,
        job: &TrainingJob,
        model: &ModelRecord,
        dataset: Arc<Dataset>,
        _progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> TrainingResult<TrainingReport> {
        self.trained.lock().unwrap().push(model.id.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::select! {
            () = tokio::time::sleep(self.delay) => {}
            () = cancel.cancelled() => {}
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(TrainingError::Cancelled);
        }
        Ok(TrainingReport {
            job_id: job.job_id.clone(),
            model_id: model.id.clone(),
            layer_count: model.layers.len(),
            warnings: Vec::new(),
            partitions: Default::default(),
            history: Default::default(),
            batches_reported: dataset.len() as u64,
            holdout: None,
        })
    }

    async fn status(&self, _job_id: &TrainingJobId) -> TrainingResult<TrainerStatus> {
        Ok(TrainerStatus::Idle)
    }

    async fn cancel(&self, _job_id: &TrainingJobId) -> TrainingResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct BatchRecorder {
    batches: Mutex<Vec<(String, u64)>>,
}

#[async_trait]
impl ProgressSink for BatchRecorder {
    async fn report(&self, event: &ProgressEvent) -> TrainingResult<()> {
        if let ProgressEvent::Batch { model_id, batch_index, .. } = event {
            self.batches.lock().unwrap().push((model_id.to_string(), *batch_index));
        }
        Ok(())
    }
}

/// Cancels the run as soon as the first batch is reported.
struct CancelOnFirstBatch(CancellationToken);

#[async_trait]
impl ProgressSink for CancelOnFirstBatch {
    async fn report(&self, event: &ProgressEvent) -> TrainingResult<()> {
        if matches!(event, ProgressEvent::Batch { .. }) {
            self.0.cancel();
        }
        Ok(())
    }
}

fn log_writes(store: &MemoryStore) -> Vec<(String, u64)> {
    store
        .writes()
        .into_iter()
        .filter_map(|w| match w {
            StoreWrite::ModelLogs { model_id, batch_index, .. } => {
                Some((model_id.to_string(), batch_index))
            }
            StoreWrite::ContainerOptions { .. } => None,
        })
        .collect()
}

#[tokio::test]
async fn test_unresolved_model_is_skipped() {
    let doc = document(vec![mlp("m1"), mlp("m3")], &["m1", "m2", "m3"], 100);
    let store = Arc::new(MemoryStore::new(doc));
    let trainer = Arc::new(MockTrainer::default());
    let coordinator = RunCoordinator::new(store, trainer.clone(), seeded());

    let report = coordinator.run_container(&"c1".into(), &CompileOptions::default()).await.unwrap();

    assert_eq!(trainer.trained(), vec!["m1", "m3"]);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.skipped(), 1);
    assert!(matches!(
        &report.outcomes[1],
        ModelOutcome::Skipped { model_id, .. } if model_id.as_str() == "m2"
    ));
}

#[tokio::test]
async fn test_missing_container_fails_run() {
    let store = Arc::new(MemoryStore::default());
    let trainer = Arc::new(MockTrainer::default());
    let coordinator = RunCoordinator::new(store.clone(), trainer, seeded());

    let options = CompileOptions::default();
    let err = coordinator.run_container(&"nope".into(), &options).await.unwrap_err();
    assert!(matches!(err, TrainingError::Precondition(PreconditionError::ContainerNotFound)));
    assert_eq!(err.to_string(), "No container found");
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_missing_dataset_fails_without_writes() {
    let mut doc = document(vec![mlp("m1")], &["m1"], 100);
    doc.upsert_container(Container::new("c1").with_models(["m1"]));
    let store = Arc::new(MemoryStore::new(doc));
    let trainer = Arc::new(MockTrainer::default());
    let coordinator = RunCoordinator::new(store.clone(), trainer.clone(), seeded());

    let options = CompileOptions::default();
    let err = coordinator.run_container(&"c1".into(), &options).await.unwrap_err();
    assert_eq!(err.to_string(), "No dataset found");
    assert!(store.writes().is_empty());
    assert!(trainer.trained().is_empty());
}

#[tokio::test]
async fn test_empty_model_list_fails_run() {
    let store = Arc::new(MemoryStore::new(document(Vec::new(), &[], 100)));
    let trainer = Arc::new(MockTrainer::default());
    let coordinator = RunCoordinator::new(store.clone(), trainer, seeded());

    let options = CompileOptions::default();
    let err = coordinator.run_container(&"c1".into(), &options).await.unwrap_err();
    assert_eq!(err.to_string(), "No models found");
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_invalid_options_fail_before_any_write() {
    let store = Arc::new(MemoryStore::new(document(vec![mlp("m1")], &["m1"], 100)));
    let trainer = Arc::new(MockTrainer::default());
    let coordinator = RunCoordinator::new(store.clone(), trainer, seeded());
    let options = CompileOptions { batch_size: 0, ..CompileOptions::default() };

    let err = coordinator.run_container(&"c1".into(), &options).await.unwrap_err();
    assert!(matches!(err, TrainingError::InvalidSpec(_)));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_unresolved_dataref_fails_after_saving_options() {
    let mut doc = document(vec![mlp("m1")], &["m1"], 100);
    doc.datarefs.clear();
    let store = Arc::new(MemoryStore::new(doc));
    let trainer = Arc::new(MockTrainer::default());
    let coordinator = RunCoordinator::new(store.clone(), trainer.clone(), seeded());

    let options = CompileOptions::default();
    let err = coordinator.run_container(&"c1".into(), &options).await.unwrap_err();
    assert_eq!(err.to_string(), "Nop dataset found");
    assert_eq!(store.writes().len(), 1);
    assert!(matches!(store.writes()[0], StoreWrite::ContainerOptions { .. }));
    assert!(trainer.trained().is_empty());
}

#[tokio::test]
async fn test_unresolved_dataset_record_fails_run() {
    let mut doc = document(vec![mlp("m1")], &["m1"], 100);
    doc.datasets.clear();
    let store = Arc::new(MemoryStore::new(doc));
    let coordinator = RunCoordinator::new(store, Arc::new(MockTrainer::default()), seeded());

    let options = CompileOptions::default();
    let err = coordinator.run_container(&"c1".into(), &options).await.unwrap_err();
    assert!(matches!(err, TrainingError::Precondition(PreconditionError::DatasetUnresolved)));
}

#[tokio::test]
async fn test_options_are_persisted_on_container() {
    let store = Arc::new(MemoryStore::new(document(vec![mlp("m1")], &["m1"], 100)));
    let trainer = Arc::new(MockTrainer::default());
    let coordinator = RunCoordinator::new(store.clone(), trainer, seeded());
    let options = CompileOptions {
        batch_size: 8,
        epochs: 2,
        loss: "meanSquaredError".to_string(),
        metrics: "mse".to_string(),
    };

    coordinator.run_container(&"c1".into(), &options).await.unwrap();

    let saved = store.snapshot().await.container(&"c1".into()).unwrap().compile_options.clone();
    assert_eq!(saved, Some(options));
}

#[tokio::test]
async fn test_model_failures_are_isolated() {
    let broken_shape = ModelRecord::new(
        "shape",
        vec![LayerSpec::new("dense").with_param("units", 1).with_param("inputShape", vec![7])],
    );
    let broken_params =
        ModelRecord::new("params", vec![LayerSpec::new("dropout").with_param("rate", 3)]);
    let store = Arc::new(MemoryStore::new(document(
        vec![broken_shape, mlp("good"), broken_params],
        &["shape", "good", "params"],
        100,
    )));
    let trainer = Arc::new(TrainingOrchestrator::new(seeded()));
    let coordinator = RunCoordinator::new(store.clone(), trainer, seeded());
    let options = CompileOptions { epochs: 1, ..CompileOptions::default() };

    let report = coordinator.run_container(&"c1".into(), &options).await.unwrap();

    let statuses: Vec<_> = report.outcomes.iter().map(ModelOutcome::is_success).collect();
    assert_eq!(statuses, vec![false, true, false]);
    assert!(matches!(
        &report.outcomes[0],
        ModelOutcome::Failed { error, .. } if error.starts_with("backend error")
    ));
    assert!(matches!(
        &report.outcomes[2],
        ModelOutcome::Failed { error, .. } if error.starts_with("layer 0")
    ));
    assert!(log_writes(&store).iter().all(|(model, _)| model == "good"));
}

#[tokio::test]
async fn test_unknown_metric_fails_each_model() {
    let doc = document(vec![mlp("m1"), mlp("m2")], &["m1", "m2"], 100);
    let store = Arc::new(MemoryStore::new(doc));
    let trainer = Arc::new(TrainingOrchestrator::new(seeded()));
    let coordinator = RunCoordinator::new(store.clone(), trainer, seeded());
    let options = CompileOptions { metrics: "f1Score".to_string(), ..CompileOptions::default() };

    let report = coordinator.run_container(&"c1".into(), &options).await.unwrap();
    assert_eq!(report.failed(), 2);
    assert!(log_writes(&store).is_empty());
}

#[tokio::test]
async fn test_progress_reported_once_per_batch() {
    let store = Arc::new(MemoryStore::new(document(vec![mlp("m1")], &["m1"], 200)));
    let recorder = Arc::new(BatchRecorder::default());
    let trainer = Arc::new(TrainingOrchestrator::new(seeded()));
    let coordinator =
        RunCoordinator::new(store.clone(), trainer, seeded()).with_observer(recorder.clone());

    let report = coordinator.run_container(&"c1".into(), &CompileOptions::default()).await.unwrap();

    // 74 training rows in batches of 5 -> 15 batches per epoch, 5 epochs
    let ModelOutcome::Succeeded { report: model_report, .. } = &report.outcomes[0] else {
        panic!("expected success, got {:?}", report.outcomes[0]);
    };
    assert_eq!(model_report.partitions.train, 74);
    assert_eq!(model_report.partitions.validation, 50);
    assert_eq!(model_report.batches_reported, 75);

    let batches: Vec<u64> = recorder.batches.lock().unwrap().iter().map(|(_, b)| *b).collect();
    assert_eq!(batches.len(), 75);
    assert!(batches.windows(2).all(|w| w[0] < w[1]));

    // Every batch reached the store before the observer saw it.
    assert_eq!(log_writes(&store).len(), 75);
    let latest = store.snapshot().await.model(&"m1".into()).unwrap().logs.clone().unwrap();
    assert_eq!(latest.batch_index, 74);
    assert!(latest.logs.contains_key("loss"));
    assert!(latest.logs.contains_key("accuracy"));
}

#[tokio::test]
async fn test_cancellation_stops_at_batch_boundary() {
    let doc = document(vec![mlp("m1"), mlp("m2")], &["m1", "m2"], 100);
    let store = Arc::new(MemoryStore::new(doc));
    let token = CancellationToken::new();
    let trainer = Arc::new(TrainingOrchestrator::new(seeded()));
    let coordinator = RunCoordinator::new(store.clone(), trainer, seeded())
        .with_observer(Arc::new(CancelOnFirstBatch(token.clone())));

    let report = coordinator
        .run_container_with_cancel(&"c1".into(), &CompileOptions::default(), token)
        .await
        .unwrap();

    assert!(matches!(
        &report.outcomes[0],
        ModelOutcome::Failed { error, .. } if error == "training cancelled"
    ));
    assert!(matches!(
        &report.outcomes[1],
        ModelOutcome::Skipped { reason, .. } if reason == "run cancelled"
    ));
    assert_eq!(log_writes(&store), vec![("m1".to_string(), 0)]);
}

#[tokio::test]
async fn test_slow_model_times_out_without_stopping_run() {
    let doc = document(vec![mlp("m1"), mlp("m2")], &["m1", "m2"], 100);
    let store = Arc::new(MemoryStore::new(doc));
    let trainer = Arc::new(MockTrainer::with_delay(Duration::from_secs(30)));
    let config = TrainingConfig { model_timeout_ms: Some(50), ..seeded() };
    let coordinator = RunCoordinator::new(store, trainer.clone(), config);

    let report = coordinator.run_container(&"c1".into(), &CompileOptions::default()).await.unwrap();

    assert_eq!(trainer.trained(), vec!["m1", "m2"]);
    assert_eq!(report.failed(), 2);
    assert!(matches!(
        &report.outcomes[0],
        ModelOutcome::Failed { error, .. } if error.contains("timed out")
    ));
}

#[tokio::test]
async fn test_timed_out_model_writes_nothing_after_its_outcome() {
    let store = Arc::new(MemoryStore::new(document(vec![mlp("m1")], &["m1"], 2000)));
    let trainer = Arc::new(TrainingOrchestrator::new(seeded()));
    let config = TrainingConfig { model_timeout_ms: Some(150), ..seeded() };
    let coordinator = RunCoordinator::new(store.clone(), trainer.clone(), config);
    let options = CompileOptions { batch_size: 1, epochs: 200, ..CompileOptions::default() };

    let report = coordinator.run_container(&"c1".into(), &options).await.unwrap();

    assert!(matches!(
        &report.outcomes[0],
        ModelOutcome::Failed { error, .. } if error.contains("timed out")
    ));
    assert_eq!(trainer.active_jobs(), 0);
    let settled = log_writes(&store).len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(log_writes(&store).len(), settled);
}

#[tokio::test]
async fn test_oversized_layers_fail_only_their_model() {
    let huge = ModelRecord::new(
        "huge",
        vec![
            LayerSpec::new("dense").with_param("units", "1e12"),
            LayerSpec::new("dense").with_param("units", 1),
        ],
    );
    let wide = ModelRecord::new(
        "wide",
        vec![
            LayerSpec::new("dense").with_param("units", 65536),
            LayerSpec::new("dense").with_param("units", 65536),
            LayerSpec::new("dense").with_param("units", 1),
        ],
    );
    let doc = document(vec![huge, mlp("m2"), wide], &["huge", "m2", "wide"], 100);
    let store = Arc::new(MemoryStore::new(doc));
    let trainer = Arc::new(TrainingOrchestrator::new(seeded()));
    let coordinator = RunCoordinator::new(store.clone(), trainer, seeded());
    let options = CompileOptions { epochs: 1, ..CompileOptions::default() };

    let report = coordinator.run_container(&"c1".into(), &options).await.unwrap();

    assert_eq!(report.failed(), 2);
    assert_eq!(report.succeeded(), 1);
    assert!(report.outcomes[1].is_success());
    assert!(matches!(
        &report.outcomes[0],
        ModelOutcome::Failed { error, .. } if error.starts_with("layer 0")
    ));
    assert!(matches!(
        &report.outcomes[2],
        ModelOutcome::Failed { error, .. } if error.contains("parameters")
    ));
    assert!(log_writes(&store).iter().all(|(model, _)| model == "m2"));
}

#[tokio::test]
async fn test_parallel_models_keep_container_order() {
    let ids = ["a", "b", "c", "d"];
    let doc = document(ids.iter().map(|id| mlp(id)).collect(), &ids, 100);
    let store = Arc::new(MemoryStore::new(doc));
    let trainer = Arc::new(MockTrainer::with_delay(Duration::from_millis(100)));
    let config = TrainingConfig { max_parallel_models: 3, ..seeded() };
    let coordinator = RunCoordinator::new(store, trainer.clone(), config);

    let report = coordinator.run_container(&"c1".into(), &CompileOptions::default()).await.unwrap();

    let order: Vec<_> = report.outcomes.iter().map(|o| o.model_id().to_string()).collect();
    assert_eq!(order, ids);
    assert_eq!(report.succeeded(), 4);
    let peak = trainer.peak.load(Ordering::SeqCst);
    assert!(peak > 1 && peak <= 3, "peak concurrency {peak}");
}
