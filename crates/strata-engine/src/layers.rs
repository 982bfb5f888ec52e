//! Layer nodes insertable into a [`Sequential`](crate::Sequential) graph,
//! and the backend network they compile into.
//!
//! Nodes are plain descriptions. Weights only exist once the graph is
//! planned against a concrete input width.

use crate::activation::Activation;
use crate::error::{EngineError, EngineResult};
use crate::init::Initializer;
use burn::module::Module;
use burn::nn::{self, DropoutConfig, Linear, LinearConfig};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Upper bound on the trainable scalars of one model.
pub const MAX_PARAMETERS: usize = 1 << 24;

/// One node of a sequential graph. The set of node kinds is closed.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerNode {
    Dense(Dense),
    Dropout(Dropout),
    Flatten(Flatten),
    Activation(ActivationLayer),
}

impl LayerNode {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dense(_) => "dense",
            Self::Dropout(_) => "dropout",
            Self::Flatten(_) => "flatten",
            Self::Activation(_) => "activation",
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Dense(d) => format!(
                "dense(units={}, activation={}, use_bias={})",
                d.units, d.activation, d.use_bias
            ),
            Self::Dropout(d) => format!("dropout(rate={})", d.rate),
            Self::Flatten(_) => "flatten".to_string(),
            Self::Activation(a) => format!("activation({})", a.activation),
        }
    }

    /// `(trainable scalars, output width)` when fed `input_width` features,
    /// or `None` if the count does not fit in a `usize`.
    #[must_use]
    pub fn parameters(&self, input_width: usize) -> Option<(usize, usize)> {
        match self {
            Self::Dense(d) => {
                let bias = if d.use_bias { d.units } else { 0 };
                let count = input_width.checked_mul(d.units)?.checked_add(bias)?;
                Some((count, d.units))
            }
            _ => Some((0, input_width)),
        }
    }
}

/// Fully connected layer: `activation(x W + b)`.
///
/// The kernel is sized from the incoming width unless an input dimension was
/// fixed up front, in which case a different width is a shape error.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    units: usize,
    activation: Activation,
    use_bias: bool,
    input_dim: Option<usize>,
    initializer: Initializer,
}

impl Dense {
    #[must_use]
    pub fn new(units: usize, activation: Activation) -> Self {
        Self {
            units,
            activation,
            use_bias: true,
            input_dim: None,
            initializer: Initializer::default(),
        }
    }

    #[must_use]
    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    #[must_use]
    pub fn with_input_dim(mut self, input_dim: Option<usize>) -> Self {
        self.input_dim = input_dim;
        self
    }

    #[must_use]
    pub fn with_initializer(mut self, initializer: Initializer) -> Self {
        self.initializer = initializer;
        self
    }

    #[must_use]
    pub fn units(&self) -> usize {
        self.units
    }

    #[must_use]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[must_use]
    pub fn input_dim(&self) -> Option<usize> {
        self.input_dim
    }
}

/// Zeroes a `rate` fraction of activations while training and rescales the
/// survivors; identity at inference.
#[derive(Debug, Clone, PartialEq)]
pub struct Dropout {
    rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> EngineResult<Self> {
        if !(0.0..1.0).contains(&rate) {
            return Err(EngineError::InvalidConfig(format!(
                "dropout rate must be in [0, 1), got {rate}"
            )));
        }
        Ok(Self { rate })
    }

    #[must_use]
    pub fn rate(&self) -> f32 {
        self.rate
    }
}

/// Batches are already `[rows, features]`, so flattening is a no-op kept for
/// graph topology.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flatten;

#[derive(Debug, Clone, PartialEq)]
pub struct ActivationLayer {
    activation: Activation,
}

impl ActivationLayer {
    #[must_use]
    pub fn new(activation: Activation) -> Self {
        Self { activation }
    }

    #[must_use]
    pub fn activation(&self) -> Activation {
        self.activation
    }
}

impl From<Dense> for LayerNode {
    fn from(value: Dense) -> Self {
        Self::Dense(value)
    }
}

impl From<Dropout> for LayerNode {
    fn from(value: Dropout) -> Self {
        Self::Dropout(value)
    }
}

impl From<Flatten> for LayerNode {
    fn from(value: Flatten) -> Self {
        Self::Flatten(value)
    }
}

impl From<ActivationLayer> for LayerNode {
    fn from(value: ActivationLayer) -> Self {
        Self::Activation(value)
    }
}

/// Trainable weights of a planned graph.
#[derive(Module, Debug)]
pub struct Network<B: Backend> {
    dense: Vec<Linear<B>>,
}

#[derive(Debug, Clone)]
pub(crate) enum Stage {
    Dense { index: usize, activation: Activation },
    Dropout(nn::Dropout),
    Activation(Activation),
}

/// How a graph runs for one input width.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub stages: Vec<Stage>,
    pub input_width: usize,
    pub output_width: usize,
    pub parameters: usize,
}

impl<B: Backend> Network<B> {
    pub(crate) fn forward(&self, plan: &Plan, input: Tensor<B, 2>) -> Tensor<B, 2> {
        plan.stages.iter().fold(input, |x, stage| match stage {
            Stage::Dense { index, activation } => activation.apply(self.dense[*index].forward(x)),
            Stage::Dropout(dropout) => dropout.forward(x),
            Stage::Activation(activation) => activation.apply(x),
        })
    }
}

/// Sizes every node for `input_width` features and allocates the weights.
///
/// Widths and the parameter budget are checked before anything is
/// allocated.
pub(crate) fn plan<B: Backend>(
    layers: &[LayerNode],
    input_width: usize,
    device: &B::Device,
) -> EngineResult<(Network<B>, Plan)> {
    if input_width == 0 {
        return Err(EngineError::Shape("input rows have no features".to_string()));
    }
    let mut width = input_width;
    let mut parameters = 0_usize;
    for (index, node) in layers.iter().enumerate() {
        if let LayerNode::Dense(dense) = node {
            if dense.units == 0 {
                return Err(EngineError::InvalidConfig(format!(
                    "layer {index}: dense units must be >= 1"
                )));
            }
            if let Some(dim) = dense.input_dim.filter(|&dim| dim != width) {
                return Err(EngineError::Shape(format!(
                    "layer {index}: dense layer expects {dim} input features, got {width}"
                )));
            }
        }
        let (count, out) = node.parameters(width).ok_or(EngineError::TooLarge {
            parameters: usize::MAX,
            limit: MAX_PARAMETERS,
        })?;
        parameters = parameters.saturating_add(count);
        width = out;
    }
    if parameters > MAX_PARAMETERS {
        return Err(EngineError::TooLarge { parameters, limit: MAX_PARAMETERS });
    }

    let mut dense = Vec::new();
    let mut stages = Vec::with_capacity(layers.len());
    let mut width = input_width;
    for node in layers {
        match node {
            LayerNode::Dense(d) => {
                let linear = LinearConfig::new(width, d.units)
                    .with_bias(d.use_bias)
                    .with_initializer(d.initializer.to_burn())
                    .init(device);
                stages.push(Stage::Dense { index: dense.len(), activation: d.activation });
                dense.push(linear);
                width = d.units;
            }
            LayerNode::Dropout(d) => {
                stages.push(Stage::Dropout(DropoutConfig::new(f64::from(d.rate)).init()));
            }
            LayerNode::Flatten(_) => {}
            LayerNode::Activation(a) => stages.push(Stage::Activation(a.activation)),
        }
    }

    let plan = Plan { stages, input_width, output_width: width, parameters };
    Ok((Network { dense }, plan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Device, EvalBackend};

    fn graph(nodes: Vec<LayerNode>, width: usize) -> EngineResult<(Network<EvalBackend>, Plan)> {
        plan::<EvalBackend>(&nodes, width, &Device::default())
    }

    #[test]
    fn test_plan_sizes_dense_layers_from_input_width() {
        let nodes = vec![
            Dense::new(3, Activation::Relu).into(),
            Dropout::new(0.5).unwrap().into(),
            Flatten.into(),
            Dense::new(2, Activation::Softmax).with_bias(false).into(),
        ];
        let (network, plan) = graph(nodes, 4).unwrap();
        assert_eq!(plan.parameters, 4 * 3 + 3 + 3 * 2);
        assert_eq!(plan.output_width, 2);
        assert_eq!(plan.stages.len(), 3);
        assert_eq!(network.num_params(), plan.parameters);
    }

    #[test]
    fn test_plan_rejects_wrong_input_dim() {
        let nodes = vec![Dense::new(2, Activation::Linear).with_input_dim(Some(5)).into()];
        assert!(matches!(graph(nodes, 4), Err(EngineError::Shape(_))));
    }

    #[test]
    fn test_plan_refuses_oversized_graphs_before_allocating() {
        let nodes = vec![
            Dense::new(1 << 16, Activation::Relu).into(),
            Dense::new(1 << 16, Activation::Relu).into(),
        ];
        let err = graph(nodes, 2).unwrap_err();
        assert!(matches!(err, EngineError::TooLarge { limit: MAX_PARAMETERS, .. }));

        let overflow = vec![Dense::new(usize::MAX, Activation::Linear).into()];
        assert!(matches!(graph(overflow, 2), Err(EngineError::TooLarge { .. })));
    }

    #[test]
    fn test_dropout_range() {
        assert!(Dropout::new(0.0).is_ok());
        assert!(Dropout::new(1.0).is_err());
    }
}
