use burn::nn;
use serde::{Deserialize, Serialize};

/// Kernel initializers for dense layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Initializer {
    #[default]
    GlorotUniform,
    HeUniform,
    LeCunUniform,
    Zeros,
    Ones,
}

impl Initializer {
    /// The equivalent backend initializer. He and LeCun uniform are Kaiming
    /// uniform with gains of `sqrt(2)` and `1`.
    pub(crate) fn to_burn(self) -> nn::Initializer {
        match self {
            Self::GlorotUniform => nn::Initializer::XavierUniform { gain: 1.0 },
            Self::HeUniform => nn::Initializer::KaimingUniform {
                gain: std::f64::consts::SQRT_2,
                fan_out_only: false,
            },
            Self::LeCunUniform => {
                nn::Initializer::KaimingUniform { gain: 1.0, fan_out_only: false }
            }
            Self::Zeros => nn::Initializer::Zeros,
            Self::Ones => nn::Initializer::Ones,
        }
    }
}
