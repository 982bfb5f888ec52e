use super::{RunStore, StoreDocument};
use crate::container::Container;
use crate::dataset::{DataRef, DatasetRecord};
use crate::error::{TrainingError, TrainingResult};
use crate::ids::{ContainerId, DataRefId, DatasetId, ModelId};
use crate::model::ModelRecord;
use crate::options::CompileOptions;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use strata_engine::Logs;
use tokio::sync::RwLock;

/// A write accepted by [`MemoryStore`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    ContainerOptions { container_id: ContainerId, options: CompileOptions },
    ModelLogs { model_id: ModelId, batch_index: u64, logs: Logs },
}

/// In-process store that records every write it accepts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: RwLock<StoreDocument>,
    writes: Mutex<Vec<StoreWrite>>,
    failing_log_writes: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new(doc: StoreDocument) -> Self {
        Self { doc: RwLock::new(doc), ..Self::default() }
    }

    pub async fn snapshot(&self) -> StoreDocument {
        self.doc.read().await.clone()
    }

    pub async fn insert_model(&self, model: ModelRecord) {
        self.doc.write().await.upsert_model(model);
    }

    #[must_use]
    pub fn writes(&self) -> Vec<StoreWrite> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Makes the next `count` log writes fail with a store error.
    pub fn fail_next_log_writes(&self, count: usize) {
        self.failing_log_writes.store(count, Ordering::SeqCst);
    }

    fn record(&self, write: StoreWrite) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(write);
        }
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn get_internal_container(&self, id: &ContainerId) -> TrainingResult<Option<Container>> {
        Ok(self.doc.read().await.container(id).cloned())
    }

    async fn get_set(&self, id: &DatasetId) -> TrainingResult<Option<DatasetRecord>> {
        Ok(self.doc.read().await.dataset(id).cloned())
    }

    async fn get_ref(&self, id: &DataRefId) -> TrainingResult<Option<DataRef>> {
        Ok(self.doc.read().await.dataref(id).cloned())
    }

    async fn get_model(&self, id: &ModelId) -> TrainingResult<Option<ModelRecord>> {
        Ok(self.doc.read().await.model(id).cloned())
    }

    async fn save_container_options(
        &self,
        id: &ContainerId,
        options: &CompileOptions,
    ) -> TrainingResult<()> {
        self.doc.write().await.set_container_options(id, options)?;
        let (container_id, options) = (id.clone(), options.clone());
        self.record(StoreWrite::ContainerOptions { container_id, options });
        Ok(())
    }

    async fn update_model_logs(
        &self,
        id: &ModelId,
        logs: &Logs,
        batch_index: u64,
    ) -> TrainingResult<()> {
        let injected = self
            .failing_log_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(TrainingError::Store(format!("write to model {id} rejected")));
        }
        self.doc.write().await.set_model_logs(id, logs, batch_index)?;
        let (model_id, logs) = (id.clone(), logs.clone());
        self.record(StoreWrite::ModelLogs { model_id, batch_index, logs });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_documents_read_as_none() {
        let store = MemoryStore::default();
        assert!(store.get_internal_container(&"c1".into()).await.unwrap().is_none());
        assert!(store.get_model(&"m1".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_options_is_recorded() {
        let mut doc = StoreDocument::default();
        doc.upsert_container(Container::new("c1"));
        let store = MemoryStore::new(doc);

        store.save_container_options(&"c1".into(), &CompileOptions::default()).await.unwrap();
        let saved = store.get_internal_container(&"c1".into()).await.unwrap().unwrap();
        assert_eq!(saved.compile_options, Some(CompileOptions::default()));
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryStore::default();
        store.insert_model(ModelRecord::new("m1", Vec::new())).await;
        store.fail_next_log_writes(1);
        let logs = Logs::new();
        assert!(store.update_model_logs(&"m1".into(), &logs, 0).await.is_err());
        assert!(store.update_model_logs(&"m1".into(), &logs, 0).await.is_ok());
    }
}
