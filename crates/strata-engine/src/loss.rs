//! Loss functions selectable at compile time.
//!
//! Every loss reduces to a scalar mean over the batch. Mean squared error
//! and Huber come from `burn::nn::loss`; the rest are composed from tensor
//! ops so the backend differentiates them.

use crate::error::EngineError;
use burn::nn::loss::{HuberLossConfig, MseLoss, Reduction};
use burn::tensor::Tensor;
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const LOG_EPSILON: f32 = 1e-7;
const HUBER_DELTA: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Loss {
    AbsoluteDifference,
    ComputeWeightedLoss,
    CosineDistance,
    HingeLoss,
    HuberLoss,
    LogLoss,
    MeanSquaredError,
    SigmoidCrossEntropy,
    SoftmaxCrossEntropy,
    BinaryCrossentropy,
}

impl Loss {
    pub const ALL: [Loss; 10] = [
        Self::AbsoluteDifference,
        Self::ComputeWeightedLoss,
        Self::CosineDistance,
        Self::HingeLoss,
        Self::HuberLoss,
        Self::LogLoss,
        Self::MeanSquaredError,
        Self::SigmoidCrossEntropy,
        Self::SoftmaxCrossEntropy,
        Self::BinaryCrossentropy,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AbsoluteDifference => "absoluteDifference",
            Self::ComputeWeightedLoss => "computeWeightedLoss",
            Self::CosineDistance => "cosineDistance",
            Self::HingeLoss => "hingeLoss",
            Self::HuberLoss => "huberLoss",
            Self::LogLoss => "logLoss",
            Self::MeanSquaredError => "meanSquaredError",
            Self::SigmoidCrossEntropy => "sigmoidCrossEntropy",
            Self::SoftmaxCrossEntropy => "softmaxCrossEntropy",
            Self::BinaryCrossentropy => "binaryCrossentropy",
        }
    }

    /// Batch-mean loss of `pred` against `target`, both `[rows, outputs]`.
    /// Callers check the shapes first.
    pub fn forward<B: Backend>(self, pred: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
        match self {
            Self::AbsoluteDifference => (pred - target).abs().mean(),
            // Unit-weight reduction treating labels as per-element losses and
            // predictions as their weights.
            Self::ComputeWeightedLoss => (pred * target).mean(),
            Self::CosineDistance => (pred * target).sum_dim(1).neg().add_scalar(1.0).mean(),
            Self::HingeLoss => {
                let sign = target.mul_scalar(2.0).sub_scalar(1.0);
                (sign * pred).neg().add_scalar(1.0).clamp_min(0.0).mean()
            }
            Self::HuberLoss => {
                HuberLossConfig::new(HUBER_DELTA).init().forward(pred, target, Reduction::Mean)
            }
            Self::LogLoss => {
                let positive = target.clone() * pred.clone().add_scalar(LOG_EPSILON).log();
                let complement = pred.neg().add_scalar(1.0 + LOG_EPSILON).log();
                let negative = target.neg().add_scalar(1.0) * complement;
                (positive + negative).neg().mean()
            }
            Self::MeanSquaredError => MseLoss::new().forward(pred, target, Reduction::Mean),
            Self::SigmoidCrossEntropy => {
                let stable = pred.clone().abs().neg().exp().log1p();
                (pred.clone().clamp_min(0.0) - pred * target + stable).mean()
            }
            Self::SoftmaxCrossEntropy => (target * log_softmax(pred, 1)).sum_dim(1).neg().mean(),
            Self::BinaryCrossentropy => {
                let p = pred.clamp(LOG_EPSILON, 1.0 - LOG_EPSILON);
                let positive = target.clone() * p.clone().log();
                let negative = target.neg().add_scalar(1.0) * p.neg().add_scalar(1.0).log();
                (positive + negative).neg().mean()
            }
        }
    }
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Loss {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| EngineError::UnknownLoss(s.to_string()))
    }
}
