//! Strata Engine
//!
//! Sequential networks on the `burn` NdArray backend:
//! - Host-side sample batches (`Matrix`)
//! - A closed set of layer nodes (`LayerNode`) assembled into a `Sequential` graph
//! - Loss and metric identifiers, Adam optimizer settings
//! - `CompiledModel::fit` with lifecycle callbacks

pub mod activation;
pub mod backend;
pub mod callbacks;
pub mod error;
pub mod init;
pub mod layers;
pub mod loss;
pub mod matrix;
pub mod metric;
pub mod model;
pub mod optimizer;

pub use activation::Activation;
pub use backend::{Device, EvalBackend, TrainBackend};
pub use callbacks::{FitCallbacks, FitConfig, History, Logs, NoopCallbacks};
pub use error::{EngineError, EngineResult};
pub use init::Initializer;
pub use layers::{ActivationLayer, Dense, Dropout, Flatten, LayerNode, MAX_PARAMETERS};
pub use loss::Loss;
pub use matrix::Matrix;
pub use metric::Metric;
pub use model::{CompiledModel, Sequential};
pub use optimizer::Adam;
