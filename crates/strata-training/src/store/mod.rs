//! Document store access for runs.
//!
//! The store is an external collaborator; [`RunStore`] is the seam. Reads
//! return `Ok(None)` for a missing document and `Err` only when the store
//! itself fails.

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::{MemoryStore, StoreWrite};

use crate::container::Container;
use crate::dataset::{DataRef, DatasetRecord};
use crate::error::{TrainingError, TrainingResult};
use crate::ids::{ContainerId, DataRefId, DatasetId, ModelId};
use crate::model::{ModelLogs, ModelRecord};
use crate::options::CompileOptions;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use strata_engine::Logs;

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn get_internal_container(&self, id: &ContainerId) -> TrainingResult<Option<Container>>;

    async fn get_set(&self, id: &DatasetId) -> TrainingResult<Option<DatasetRecord>>;

    async fn get_ref(&self, id: &DataRefId) -> TrainingResult<Option<DataRef>>;

    async fn get_model(&self, id: &ModelId) -> TrainingResult<Option<ModelRecord>>;

    async fn save_container_options(
        &self,
        id: &ContainerId,
        options: &CompileOptions,
    ) -> TrainingResult<()>;

    /// Replaces the model's persisted progress with the given batch.
    async fn update_model_logs(
        &self,
        id: &ModelId,
        logs: &Logs,
        batch_index: u64,
    ) -> TrainingResult<()>;
}

/// Every document the store holds, as one serializable value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreDocument {
    pub containers: Vec<Container>,
    pub datasets: Vec<DatasetRecord>,
    pub datarefs: Vec<DataRef>,
    pub models: Vec<ModelRecord>,
}

impl StoreDocument {
    #[must_use]
    pub fn container(&self, id: &ContainerId) -> Option<&Container> {
        self.containers.iter().find(|c| &c.id == id)
    }

    #[must_use]
    pub fn dataset(&self, id: &DatasetId) -> Option<&DatasetRecord> {
        self.datasets.iter().find(|d| &d.id == id)
    }

    #[must_use]
    pub fn dataref(&self, id: &DataRefId) -> Option<&DataRef> {
        self.datarefs.iter().find(|d| &d.id == id)
    }

    #[must_use]
    pub fn model(&self, id: &ModelId) -> Option<&ModelRecord> {
        self.models.iter().find(|m| &m.id == id)
    }

    pub fn upsert_container(&mut self, container: Container) {
        match self.containers.iter_mut().find(|c| c.id == container.id) {
            Some(existing) => *existing = container,
            None => self.containers.push(container),
        }
    }

    pub fn upsert_dataset(&mut self, dataset: DatasetRecord) {
        match self.datasets.iter_mut().find(|d| d.id == dataset.id) {
            Some(existing) => *existing = dataset,
            None => self.datasets.push(dataset),
        }
    }

    pub fn upsert_dataref(&mut self, dataref: DataRef) {
        match self.datarefs.iter_mut().find(|d| d.id == dataref.id) {
            Some(existing) => *existing = dataref,
            None => self.datarefs.push(dataref),
        }
    }

    pub fn upsert_model(&mut self, model: ModelRecord) {
        match self.models.iter_mut().find(|m| m.id == model.id) {
            Some(existing) => *existing = model,
            None => self.models.push(model),
        }
    }

    pub(crate) fn set_container_options(
        &mut self,
        id: &ContainerId,
        options: &CompileOptions,
    ) -> TrainingResult<()> {
        let container = self
            .containers
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| TrainingError::Store(format!("container {id} does not exist")))?;
        container.compile_options = Some(options.clone());
        Ok(())
    }

    pub(crate) fn set_model_logs(
        &mut self,
        id: &ModelId,
        logs: &Logs,
        batch_index: u64,
    ) -> TrainingResult<()> {
        let model = self
            .models
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| TrainingError::Store(format!("model {id} does not exist")))?;
        model.logs = Some(ModelLogs { batch_index, logs: logs.clone(), updated_at: Utc::now() });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LayerSpec;

    #[test]
    fn test_upsert_replaces_by_id() {
        let mut doc = StoreDocument::default();
        doc.upsert_model(ModelRecord::new("m1", vec![LayerSpec::new("flatten")]));
        doc.upsert_model(ModelRecord::new("m1", Vec::new()));
        assert_eq!(doc.models.len(), 1);
        assert!(doc.model(&"m1".into()).unwrap().layers.is_empty());
    }

    #[test]
    fn test_model_logs_overwrite_previous_batch() {
        let mut doc = StoreDocument::default();
        doc.upsert_model(ModelRecord::new("m1", Vec::new()));
        let id = ModelId::from("m1");
        let logs = Logs::from([("loss".to_string(), 0.5)]);
        doc.set_model_logs(&id, &logs, 3).unwrap();
        doc.set_model_logs(&id, &logs, 4).unwrap();
        assert_eq!(doc.model(&id).unwrap().logs.as_ref().unwrap().batch_index, 4);
        assert!(doc.set_model_logs(&"missing".into(), &logs, 0).is_err());
    }
}
