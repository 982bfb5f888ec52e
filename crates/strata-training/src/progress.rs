use crate::error::TrainingResult;
use crate::ids::ModelId;
use crate::job::TrainingJobId;
use crate::store::RunStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use strata_engine::Logs;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { job_id: TrainingJobId, model_id: ModelId },
    /// One completed batch. `batch_index` counts across epochs.
    Batch { model_id: ModelId, epoch: usize, batch_index: u64, logs: Logs },
    Epoch { model_id: ModelId, epoch: usize, logs: Logs },
    Finished { job_id: TrainingJobId, model_id: ModelId },
}

impl ProgressEvent {
    #[must_use]
    pub fn model_id(&self) -> &ModelId {
        match self {
            Self::Started { model_id, .. }
            | Self::Batch { model_id, .. }
            | Self::Epoch { model_id, .. }
            | Self::Finished { model_id, .. } => model_id,
        }
    }
}

/// Receives progress events. An error stops the training run that emitted
/// the event.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, event: &ProgressEvent) -> TrainingResult<()>;
}

/// `loss=0.1234 accuracy=0.5000`
#[must_use]
pub fn format_logs(logs: &Logs) -> String {
    let mut out = String::new();
    for (key, value) in logs {
        if !out.is_empty() {
            out.push(' ');
        }
        let _ = write!(out, "{key}={value:.4}");
    }
    out
}

/// Persists batch events as the model's latest logs.
pub struct StoreProgressSink {
    store: Arc<dyn RunStore>,
    retries: u32,
    backoff: Duration,
}

impl StoreProgressSink {
    #[must_use]
    pub fn new(store: Arc<dyn RunStore>, retries: u32) -> Self {
        Self { store, retries, backoff: Duration::from_millis(50) }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl ProgressSink for StoreProgressSink {
    async fn report(&self, event: &ProgressEvent) -> TrainingResult<()> {
        let ProgressEvent::Batch { model_id, batch_index, logs, .. } = event else {
            debug!(model_id = %event.model_id(), ?event, "progress");
            return Ok(());
        };

        let mut attempt = 0;
        loop {
            match self.store.update_model_logs(model_id, logs, *batch_index).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        model_id = %model_id,
                        batch = batch_index,
                        attempt,
                        error = %e,
                        "log write failed, retrying"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

#[async_trait]
impl ProgressSink for StdoutProgressSink {
    async fn report(&self, event: &ProgressEvent) -> TrainingResult<()> {
        match event {
            ProgressEvent::Started { model_id, job_id } => {
                println!("[train:{model_id}] started ({job_id})");
            }
            ProgressEvent::Batch { model_id, epoch, batch_index, logs } => {
                let logs = format_logs(logs);
                println!("[train:{model_id}] epoch {} batch {batch_index} {logs}", epoch + 1);
            }
            ProgressEvent::Epoch { model_id, epoch, logs } => {
                println!("[train:{model_id}] epoch {} done {}", epoch + 1, format_logs(logs));
            }
            ProgressEvent::Finished { model_id, .. } => println!("[train:{model_id}] finished"),
        }
        Ok(())
    }
}

/// Forwards each event to every inner sink in order, stopping at the first
/// failure.
#[derive(Default)]
pub struct FanoutProgressSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutProgressSink {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl ProgressSink for FanoutProgressSink {
    async fn report(&self, event: &ProgressEvent) -> TrainingResult<()> {
        for sink in &self.sinks {
            sink.report(event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelRecord;
    use crate::store::{MemoryStore, StoreWrite};

    fn batch(index: u64) -> ProgressEvent {
        ProgressEvent::Batch {
            model_id: "m1".into(),
            epoch: 0,
            batch_index: index,
            logs: Logs::from([("loss".to_string(), 0.5)]),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(batch(3)).unwrap();
        assert_eq!(json["type"], "batch");
        assert_eq!(json["batch_index"], 3);
    }

    #[test]
    fn test_format_logs() {
        let logs = Logs::from([("loss".to_string(), 0.5), ("accuracy".to_string(), 0.25)]);
        assert_eq!(format_logs(&logs), "accuracy=0.2500 loss=0.5000");
    }

    #[tokio::test]
    async fn test_store_sink_retries_failed_writes() {
        let store = Arc::new(MemoryStore::default());
        store.insert_model(ModelRecord::new("m1", Vec::new())).await;
        store.fail_next_log_writes(2);

        let sink = StoreProgressSink::new(store.clone(), 2).with_backoff(Duration::from_millis(1));
        sink.report(&batch(0)).await.unwrap();
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_store_sink_gives_up_after_retries() {
        let store = Arc::new(MemoryStore::default());
        store.insert_model(ModelRecord::new("m1", Vec::new())).await;
        store.fail_next_log_writes(3);

        let sink = StoreProgressSink::new(store.clone(), 1).with_backoff(Duration::from_millis(1));
        assert!(sink.report(&batch(0)).await.is_err());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_store_sink_ignores_non_batch_events() {
        let store = Arc::new(MemoryStore::default());
        let sink = StoreProgressSink::new(store.clone(), 0);
        let event = ProgressEvent::Epoch { model_id: "m1".into(), epoch: 0, logs: Logs::new() };
        sink.report(&event).await.unwrap();
        assert!(!store.writes().iter().any(|w| matches!(w, StoreWrite::ModelLogs { .. })));
    }
}
