use crate::ids::{ContainerId, DatasetId, ModelId};
use crate::options::CompileOptions;
use serde::{Deserialize, Serialize};

/// A training request: one dataset, the models to train on it, and the
/// options of the most recent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dataset: Option<DatasetId>,
    #[serde(default)]
    pub models: Vec<ModelId>,
    #[serde(default)]
    pub compile_options: Option<CompileOptions>,
}

impl Container {
    #[must_use]
    pub fn new(id: impl Into<ContainerId>) -> Self {
        let id = id.into();
        Self { name: id.to_string(), id, dataset: None, models: Vec::new(), compile_options: None }
    }

    #[must_use]
    pub fn with_dataset(mut self, dataset: impl Into<DatasetId>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    #[must_use]
    pub fn with_models<I, M>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<ModelId>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }
}
