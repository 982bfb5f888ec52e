//! Activation identifiers and their backend implementations.

use crate::error::EngineError;
use burn::tensor::Tensor;
use burn::tensor::activation;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SELU_ALPHA: f32 = 1.673_263_2;
const SELU_SCALE: f32 = 1.050_701;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Activation {
    Elu,
    HardSigmoid,
    #[default]
    Linear,
    Relu,
    Relu6,
    Selu,
    Sigmoid,
    Softmax,
    Softplus,
    Softsign,
    Tanh,
    Swish,
}

impl Activation {
    pub const ALL: [Activation; 12] = [
        Self::Elu,
        Self::HardSigmoid,
        Self::Linear,
        Self::Relu,
        Self::Relu6,
        Self::Selu,
        Self::Sigmoid,
        Self::Softmax,
        Self::Softplus,
        Self::Softsign,
        Self::Tanh,
        Self::Swish,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Elu => "elu",
            Self::HardSigmoid => "hardSigmoid",
            Self::Linear => "linear",
            Self::Relu => "relu",
            Self::Relu6 => "relu6",
            Self::Selu => "selu",
            Self::Sigmoid => "sigmoid",
            Self::Softmax => "softmax",
            Self::Softplus => "softplus",
            Self::Softsign => "softsign",
            Self::Tanh => "tanh",
            Self::Swish => "swish",
        }
    }

    /// Applies the activation to a `[rows, features]` batch. Softmax
    /// normalizes each row.
    pub fn apply<B: Backend>(self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Self::Elu => elu(x, 1.0),
            Self::HardSigmoid => x.mul_scalar(0.2).add_scalar(0.5).clamp(0.0, 1.0),
            Self::Linear => x,
            Self::Relu => activation::relu(x),
            Self::Relu6 => activation::relu(x).clamp_max(6.0),
            Self::Selu => elu(x, SELU_ALPHA).mul_scalar(SELU_SCALE),
            Self::Sigmoid => activation::sigmoid(x),
            Self::Softmax => activation::softmax(x, 1),
            Self::Softplus => x.clone().clamp_min(0.0) + x.abs().neg().exp().log1p(),
            Self::Softsign => x.clone() / x.abs().add_scalar(1.0),
            Self::Tanh => activation::tanh(x),
            Self::Swish => activation::silu(x),
        }
    }
}

/// `x` where positive, `alpha * (e^x - 1)` elsewhere. The exponential only
/// sees the non-positive part so the unused branch cannot overflow.
fn elu<B: Backend>(x: Tensor<B, 2>, alpha: f32) -> Tensor<B, 2> {
    let negative = x.clone().lower_equal_elem(0.0);
    let curve = x.clone().clamp_max(0.0).exp().sub_scalar(1.0).mul_scalar(alpha);
    x.mask_where(negative, curve)
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Activation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| EngineError::InvalidConfig(format!("unknown activation: {s}")))
    }
}
