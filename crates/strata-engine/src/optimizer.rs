use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::AdamConfig;

use crate::backend::TrainBackend;

/// Optimizer state driving one model's weights.
pub(crate) type AdamOptimizer<M> = OptimizerAdaptor<burn::optim::Adam, M, TrainBackend>;

/// Adaptive moment estimation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adam {
    learning_rate: f64,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.001)
    }
}

impl Adam {
    #[must_use]
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate, beta1: 0.9, beta2: 0.999, epsilon: 1e-7 }
    }

    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub(crate) fn init<M: AutodiffModule<TrainBackend>>(&self) -> AdamOptimizer<M> {
        AdamConfig::new()
            .with_beta_1(self.beta1)
            .with_beta_2(self.beta2)
            .with_epsilon(self.epsilon)
            .init()
    }
}
