use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("unknown loss identifier: {0}")]
    UnknownLoss(String),

    #[error("unknown metric identifier: {0}")]
    UnknownMetric(String),

    #[error("model has no layers")]
    EmptyModel,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The graph would need more trainable scalars than the backend allows.
    #[error("model needs {parameters} parameters, the limit is {limit}")]
    TooLarge { parameters: usize, limit: usize },

    #[error("backend data error: {0}")]
    Data(String),

    /// Raised by a fit callback to end training early.
    #[error("training stopped: {0}")]
    Stopped(String),
}
