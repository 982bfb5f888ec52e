//! Strata Training
//!
//! Turns stored model definitions into trained models:
//! - Resolving layer specs through a closed registry (`LayerKind`)
//! - Building and compiling graphs (`ModelBuilder`)
//! - Splitting datasets into train / validation / test (`partition`)
//! - Running fit loops with per-batch progress (`TrainingOrchestrator`)
//! - Coordinating a container's models against a store (`RunCoordinator`)

pub mod builder;
pub mod config;
pub mod container;
pub mod coordinator;
pub mod dataset;
pub mod error;
pub mod ids;
pub mod job;
pub mod model;
pub mod options;
pub mod orchestrator;
pub mod partition;
pub mod progress;
pub mod registry;
pub mod store;
pub mod trainer;

pub use builder::{BuildWarning, BuiltGraph, ModelBuilder};
pub use config::TrainingConfig;
pub use container::Container;
pub use coordinator::{ModelOutcome, RunCoordinator, RunReport};
pub use dataset::{DataRef, Dataset, DatasetRecord};
pub use error::{PreconditionError, TrainingError, TrainingResult};
pub use ids::{ContainerId, DataRefId, DatasetId, ModelId};
pub use job::{TrainingJob, TrainingJobId};
pub use model::{LayerParameter, LayerSpec, ModelLogs, ModelRecord};
pub use options::CompileOptions;
pub use orchestrator::TrainingOrchestrator;
pub use partition::{PartitionSizes, Partitions, Split, SplitPolicy, TensorSet, partition};
pub use progress::{
    FanoutProgressSink, ProgressEvent, ProgressSink, StdoutProgressSink, StoreProgressSink,
    format_logs,
};
pub use registry::{
    InvalidParameters, LayerConfig, LayerKind, MAX_INPUT_DIM, MAX_UNITS, construct,
};
pub use store::{JsonFileStore, MemoryStore, RunStore, StoreDocument, StoreWrite};
pub use trainer::{ModelTrainer, TrainerStatus, TrainingReport};
