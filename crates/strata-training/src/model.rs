use crate::ids::ModelId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strata_engine::Logs;

/// One named parameter of a layer, as edited by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerParameter {
    pub name: String,
    pub value: Value,
}

/// Declarative description of one graph node: a layer kind plus parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<LayerParameter>,
}

impl LayerSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), parameters: Vec::new() }
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push(LayerParameter { name: name.into(), value: value.into() });
        self
    }

    /// Collapses the parameter list into a map. A repeated name keeps the
    /// value of its last occurrence.
    #[must_use]
    pub fn flatten_parameters(&self) -> Map<String, Value> {
        let mut params = Map::new();
        for param in &self.parameters {
            params.insert(param.name.clone(), param.value.clone());
        }
        params
    }
}

/// Latest training progress persisted on a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelLogs {
    pub batch_index: u64,
    pub logs: Logs,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: ModelId,
    #[serde(default)]
    pub name: String,
    /// Order defines graph topology.
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub logs: Option<ModelLogs>,
}

impl ModelRecord {
    #[must_use]
    pub fn new(id: impl Into<ModelId>, layers: Vec<LayerSpec>) -> Self {
        let id = id.into();
        Self { name: id.to_string(), id, layers, logs: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_keeps_last_duplicate() {
        let spec = LayerSpec::new("dense")
            .with_param("units", 4)
            .with_param("activation", "relu")
            .with_param("units", 16);
        let params = spec.flatten_parameters();
        assert_eq!(params.len(), 2);
        assert_eq!(params["units"], json!(16));
    }

    #[test]
    fn test_layer_spec_document_shape() {
        let spec: LayerSpec = serde_json::from_value(json!({
            "name": "dropout",
            "parameters": [{"name": "rate", "value": 0.2}]
        }))
        .unwrap();
        assert_eq!(spec.parameters[0].value, json!(0.2));
    }
}
