use crate::error::{TrainingError, TrainingResult};
use crate::model::LayerSpec;
use crate::options::CompileOptions;
use crate::registry::{self, LayerKind};
use serde::{Deserialize, Serialize};
use strata_engine::{Adam, CompiledModel, Sequential};
use tracing::{debug, warn};

/// A layer spec that was left out of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildWarning {
    /// Position of the spec in the model definition.
    pub index: usize,
    pub layer: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct BuiltGraph {
    pub graph: Sequential,
    pub warnings: Vec<BuildWarning>,
}

/// Turns layer specs into a sequential graph and compiles it.
///
/// Each call to [`build`](Self::build) produces a fresh graph; nothing is
/// shared between models.
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    seed: Option<u64>,
}

impl ModelBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Builds a graph from `specs` in order.
    ///
    /// Specs naming an unknown layer kind are skipped and reported as
    /// warnings. Invalid parameters for a known kind fail the build.
    pub fn build(&self, specs: &[LayerSpec]) -> TrainingResult<BuiltGraph> {
        let mut graph = Sequential::new().with_seed(self.seed);
        graph.reset();
        let mut warnings = Vec::new();

        for (index, spec) in specs.iter().enumerate() {
            let Some(kind) = LayerKind::resolve(&spec.name) else {
                warn!(index, layer = %spec.name, "unknown layer kind, skipping");
                warnings.push(BuildWarning {
                    index,
                    layer: spec.name.clone(),
                    message: format!("unknown layer kind `{}`", spec.name),
                });
                continue;
            };
            let params = spec.flatten_parameters();
            let node = registry::construct(kind, &params)
                .map_err(|source| TrainingError::InvalidLayer { index, source })?;
            debug!(index, layer = %node.describe(), "layer added");
            graph.add(node);
        }

        Ok(BuiltGraph { graph, warnings })
    }

    /// Compiles `graph` with Adam at default hyperparameters and the loss and
    /// metric named by `options`.
    pub fn compile(
        &self,
        graph: Sequential,
        options: &CompileOptions,
    ) -> TrainingResult<CompiledModel> {
        let loss = options.loss_id()?;
        let metric = options.metric_id()?;
        graph
            .compile(Adam::default(), loss, metric)
            .map_err(|e| TrainingError::Compile(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs() -> Vec<LayerSpec> {
        vec![
            LayerSpec::new("dense").with_param("units", 8).with_param("inputShape", vec![4]),
            LayerSpec::new("conv2d").with_param("filters", 3),
            LayerSpec::new("dropout").with_param("rate", 0.2),
            LayerSpec::new("dense").with_param("units", 1).with_param("activation", "sigmoid"),
        ]
    }

    #[test]
    fn test_build_keeps_resolved_specs_in_order() {
        let built = ModelBuilder::new().build(&specs()).unwrap();
        let kinds: Vec<_> = built.graph.layers().iter().map(|l| l.kind()).collect();
        assert_eq!(kinds, vec!["dense", "dropout", "dense"]);
        assert_eq!(built.warnings.len(), 1);
        assert_eq!(built.warnings[0].index, 1);
        assert_eq!(built.warnings[0].layer, "conv2d");
    }

    #[test]
    fn test_build_uses_last_duplicate_parameter() {
        let specs = vec![LayerSpec::new("dense").with_param("units", 4).with_param("units", 9)];
        let built = ModelBuilder::new().build(&specs).unwrap();
        let strata_engine::LayerNode::Dense(dense) = &built.graph.layers()[0] else {
            panic!("expected a dense layer");
        };
        assert_eq!(dense.units(), 9);
    }

    #[test]
    fn test_build_rejects_invalid_parameters() {
        let specs = vec![
            LayerSpec::new("flatten"),
            LayerSpec::new("dropout").with_param("rate", 2.0),
        ];
        let err = ModelBuilder::new().build(&specs).unwrap_err();
        assert!(matches!(err, TrainingError::InvalidLayer { index: 1, .. }));
    }

    #[test]
    fn test_compile_rejects_unknown_loss() {
        let builder = ModelBuilder::new();
        let built = builder.build(&specs()).unwrap();
        let loss = "meanSquaredLogError".to_string();
        let options = CompileOptions { loss, ..CompileOptions::default() };
        let err = builder.compile(built.graph, &options).unwrap_err();
        assert!(matches!(err, TrainingError::Compile(_)));
    }

    #[test]
    fn test_compile_rejects_empty_graph() {
        let builder = ModelBuilder::new();
        let built = builder.build(&[LayerSpec::new("conv2d")]).unwrap();
        assert!(built.graph.is_empty());
        let err = builder.compile(built.graph, &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, TrainingError::Compile(_)));
    }
}
