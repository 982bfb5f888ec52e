//! Sequential graphs and the compiled, trainable model.

use crate::backend::{Device, EvalBackend, TrainBackend, to_matrix, to_tensor};
use crate::callbacks::{FitCallbacks, FitConfig, History, Logs};
use crate::error::{EngineError, EngineResult};
use crate::layers::{self, LayerNode, Network, Plan};
use crate::loss::Loss;
use crate::matrix::Matrix;
use crate::metric::Metric;
use crate::optimizer::{Adam, AdamOptimizer};
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::ElementConversion;
use burn::tensor::backend::Backend;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::fmt;
use tracing::debug;

/// Ordered stack of layers; the output of each node feeds the next.
#[derive(Debug, Clone, Default)]
pub struct Sequential {
    layers: Vec<LayerNode>,
    seed: Option<u64>,
}

impl Sequential {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes the RNG used for weight init, shuffling and dropout.
    #[must_use]
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn add(&mut self, layer: impl Into<LayerNode>) {
        self.layers.push(layer.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    #[must_use]
    pub fn layers(&self) -> &[LayerNode] {
        &self.layers
    }

    /// Drops every node, returning the graph to its freshly constructed state.
    pub fn reset(&mut self) {
        self.layers.clear();
    }

    /// Fixes the training configuration. Weights are allocated on the first
    /// batch, once the input width is known.
    pub fn compile(self, adam: Adam, loss: Loss, metric: Metric) -> EngineResult<CompiledModel> {
        if self.layers.is_empty() {
            return Err(EngineError::EmptyModel);
        }
        let rng = match self.seed {
            Some(seed) => {
                TrainBackend::seed(seed);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_entropy(),
        };
        Ok(CompiledModel {
            layers: self.layers,
            adam,
            loss,
            metric,
            rng,
            device: Device::default(),
            built: None,
        })
    }
}

/// Weights and optimizer state for one input width.
struct Built {
    network: Network<TrainBackend>,
    plan: Plan,
    optimizer: AdamOptimizer<Network<TrainBackend>>,
}

pub struct CompiledModel {
    layers: Vec<LayerNode>,
    adam: Adam,
    loss: Loss,
    metric: Metric,
    rng: StdRng,
    device: Device,
    built: Option<Built>,
}

impl fmt::Debug for CompiledModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledModel")
            .field("layers", &self.layers)
            .field("adam", &self.adam)
            .field("loss", &self.loss)
            .field("metric", &self.metric)
            .field("parameters", &self.built.as_ref().map(|b| b.plan.parameters))
            .finish_non_exhaustive()
    }
}

impl CompiledModel {
    #[must_use]
    pub fn loss(&self) -> Loss {
        self.loss
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    #[must_use]
    pub fn layers(&self) -> &[LayerNode] {
        &self.layers
    }

    #[must_use]
    pub fn optimizer(&self) -> &Adam {
        &self.adam
    }

    /// Allocates the weights on first use. Later calls must keep the width.
    fn ensure_built(&mut self, width: usize) -> EngineResult<&mut Built> {
        let built = match self.built.take() {
            Some(built) => built,
            None => {
                let (network, plan) = layers::plan(&self.layers, width, &self.device)?;
                Built { network, plan, optimizer: self.adam.init() }
            }
        };
        let built = self.built.insert(built);
        if built.plan.input_width != width {
            return Err(EngineError::Shape(format!(
                "model was built for {} input features, got {width}",
                built.plan.input_width
            )));
        }
        Ok(built)
    }

    fn prepare(&mut self, x: &Matrix, y: &Matrix) -> EngineResult<&mut Built> {
        if x.is_empty() {
            return Err(EngineError::InvalidConfig("no samples".to_string()));
        }
        if x.rows() != y.rows() {
            return Err(EngineError::Shape(format!(
                "{} samples but {} labels",
                x.rows(),
                y.rows()
            )));
        }
        let built = self.ensure_built(x.cols())?;
        if y.cols() != built.plan.output_width {
            return Err(EngineError::Shape(format!(
                "model outputs {} values per sample, labels have {}",
                built.plan.output_width,
                y.cols()
            )));
        }
        Ok(built)
    }

    fn batch_logs(&self, loss: f64, pred: &Matrix, y: &Matrix) -> EngineResult<Logs> {
        let mut logs = Logs::new();
        logs.insert("loss".to_string(), loss);
        logs.insert(self.metric.as_str().to_string(), self.metric.compute(pred, y)?);
        Ok(logs)
    }

    /// Runs one optimizer step on a single batch.
    pub fn train_on_batch(&mut self, x: &Matrix, y: &Matrix) -> EngineResult<Logs> {
        let (loss_fn, learning_rate) = (self.loss, self.adam.learning_rate());
        let device = self.device.clone();
        let built = self.prepare(x, y)?;

        let input = to_tensor::<TrainBackend>(x.clone(), &device);
        let pred = built.network.forward(&built.plan, input);
        let loss = loss_fn.forward(pred.clone(), to_tensor(y.clone(), &device));
        let value = loss.clone().into_scalar().elem::<f64>();
        let pred = to_matrix(pred)?;

        if built.plan.parameters > 0 {
            let grads = GradientsParams::from_grads(loss.backward(), &built.network);
            built.network = built.optimizer.step(learning_rate, built.network.clone(), grads);
        }
        self.batch_logs(value, &pred, y)
    }

    /// Loss and metric over the whole of `x`/`y`, without updating weights.
    pub fn evaluate(&mut self, x: &Matrix, y: &Matrix) -> EngineResult<Logs> {
        let (loss_fn, device) = (self.loss, self.device.clone());
        let built = self.prepare(x, y)?;
        let network: Network<EvalBackend> = built.network.valid();
        let pred = network.forward(&built.plan, to_tensor(x.clone(), &device));
        let value = loss_fn
            .forward(pred.clone(), to_tensor(y.clone(), &device))
            .into_scalar()
            .elem::<f64>();
        let pred = to_matrix(pred)?;
        self.batch_logs(value, &pred, y)
    }

    /// Trains for `config.epochs` passes over `x`/`y` in mini-batches of
    /// `config.batch_size`. The last batch of an epoch may be smaller.
    pub fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        config: &FitConfig,
        validation: Option<(&Matrix, &Matrix)>,
        callbacks: &mut dyn FitCallbacks,
    ) -> EngineResult<History> {
        if config.batch_size == 0 {
            return Err(EngineError::InvalidConfig("batch_size must be >= 1".to_string()));
        }
        if config.epochs == 0 {
            return Err(EngineError::InvalidConfig("epochs must be >= 1".to_string()));
        }
        if x.is_empty() {
            return Err(EngineError::InvalidConfig("no training samples".to_string()));
        }
        self.prepare(x, y)?;

        let mut history = History::default();
        let mut order: Vec<usize> = (0..x.rows()).collect();
        callbacks.on_train_begin()?;

        for epoch in 0..config.epochs {
            if config.shuffle {
                order.shuffle(&mut self.rng);
            }
            let mut totals = Logs::new();
            for chunk in order.chunks(config.batch_size) {
                let batch_x = x.gather_rows(chunk);
                let batch_y = y.gather_rows(chunk);
                let logs = self.train_on_batch(&batch_x, &batch_y)?;
                for (key, value) in &logs {
                    *totals.entry(key.clone()).or_insert(0.0) += value * chunk.len() as f64;
                }
                callbacks.on_batch_end(epoch, history.steps, &logs)?;
                history.steps += 1;
            }

            let mut epoch_logs: Logs =
                totals.into_iter().map(|(k, v)| (k, v / x.rows() as f64)).collect();
            if let Some((vx, vy)) = validation {
                for (key, value) in self.evaluate(vx, vy)? {
                    epoch_logs.insert(format!("val_{key}"), value);
                }
            }
            debug!(epoch, ?epoch_logs, "epoch finished");
            callbacks.on_epoch_end(epoch, &epoch_logs)?;
            history.epochs.push(epoch_logs);
        }

        callbacks.on_train_end(&history)?;
        Ok(history)
    }
}
