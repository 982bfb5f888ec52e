use super::{RunStore, StoreDocument};
use crate::container::Container;
use crate::dataset::{DataRef, DatasetRecord};
use crate::error::{TrainingError, TrainingResult};
use crate::ids::{ContainerId, DataRefId, DatasetId, ModelId};
use crate::model::ModelRecord;
use crate::options::CompileOptions;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use strata_engine::Logs;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Store backed by a single JSON document on disk.
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so readers never see a partial document.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    doc: Mutex<StoreDocument>,
}

impl JsonFileStore {
    /// Loads an existing store file.
    pub async fn open(path: impl Into<PathBuf>) -> TrainingResult<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path).await?;
        let doc: StoreDocument = serde_json::from_str(&content).map_err(|e| {
            TrainingError::Store(format!("invalid store file {}: {e}", path.display()))
        })?;
        Ok(Self { path, doc: Mutex::new(doc) })
    }

    /// Writes `doc` to `path`, replacing any existing file.
    pub async fn create(path: impl Into<PathBuf>, doc: StoreDocument) -> TrainingResult<Self> {
        let store = Self { path: path.into(), doc: Mutex::new(doc) };
        {
            let doc = store.doc.lock().await;
            store.persist(&doc).await?;
        }
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> StoreDocument {
        self.doc.lock().await.clone()
    }

    async fn persist(&self, doc: &StoreDocument) -> TrainingResult<()> {
        let json = serde_json::to_string_pretty(doc)?;
        let file_name = self.path.file_name().and_then(|n| n.to_str()).unwrap_or("store.json");
        let temp_path = self.path.with_file_name(format!(".{file_name}.tmp.{}", Uuid::new_v4()));

        let written = match fs::write(&temp_path, json).await {
            Ok(()) => fs::rename(&temp_path, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        debug!(path = %self.path.display(), "store persisted");
        Ok(())
    }
}

#[async_trait]
impl RunStore for JsonFileStore {
    async fn get_internal_container(
        &self,
        id: &ContainerId,
    ) -> TrainingResult<Option<Container>> {
        Ok(self.doc.lock().await.container(id).cloned())
    }

    async fn get_set(&self, id: &DatasetId) -> TrainingResult<Option<DatasetRecord>> {
        Ok(self.doc.lock().await.dataset(id).cloned())
    }

    async fn get_ref(&self, id: &DataRefId) -> TrainingResult<Option<DataRef>> {
        Ok(self.doc.lock().await.dataref(id).cloned())
    }

    async fn get_model(&self, id: &ModelId) -> TrainingResult<Option<ModelRecord>> {
        Ok(self.doc.lock().await.model(id).cloned())
    }

    async fn save_container_options(
        &self,
        id: &ContainerId,
        options: &CompileOptions,
    ) -> TrainingResult<()> {
        let mut doc = self.doc.lock().await;
        doc.set_container_options(id, options)?;
        self.persist(&doc).await
    }

    async fn update_model_logs(
        &self,
        id: &ModelId,
        logs: &Logs,
        batch_index: u64,
    ) -> TrainingResult<()> {
        let mut doc = self.doc.lock().await;
        doc.set_model_logs(id, logs, batch_index)?;
        self.persist(&doc).await
    }
}
