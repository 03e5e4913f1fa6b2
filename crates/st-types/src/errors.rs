use thiserror::Error;

/// Main error type for the SegTune system
#[derive(Error, Debug)]
pub enum StError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Training error: {0}")]
    Train(#[from] TrainError),

    #[error("Tuning error: {0}")]
    Tune(#[from] TuneError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Training configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown configuration key: {key}")]
    UnknownKey { key: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Malformed configuration: {message}")]
    Malformed { message: String },
}

/// Network structure and checkpoint errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid class count {num_classes}: at least 2 are required (class 0 is background)")]
    InvalidClassCount { num_classes: usize },

    #[error("Incompatible network: missing head `{path}`")]
    MissingHead { path: String },

    #[error("Shape mismatch in {layer}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        layer: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Checkpoint error: {message}")]
    Checkpoint { message: String },
}

/// Errors raised by a training procedure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainError {
    #[error("Trial stopped by scheduler")]
    Stopped,

    #[error("Metric {name} missing from report")]
    MissingMetric { name: String },

    #[error("Metric {name} has invalid value {value}")]
    InvalidMetric { name: String, value: f64 },

    #[error("Dataset has {len} samples, need more than the {holdout} held out for evaluation")]
    DatasetTooSmall { len: usize, holdout: usize },

    #[error("Training execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("Trainer process error: {message}")]
    Process { message: String },
}

/// Orchestrator-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TuneError {
    #[error("Invalid scheduler configuration: {message}")]
    InvalidScheduler { message: String },

    #[error("Invalid search space: {message}")]
    InvalidSearchSpace { message: String },

    #[error("Trial requests {requested} {resource} but the pool only has {available}")]
    QuotaExceedsPool {
        resource: String,
        requested: u32,
        available: u32,
    },

    #[error("No trial reported a value for {metric}")]
    NoSuccessfulTrials { metric: String },

    #[error("Resource pool closed")]
    PoolClosed,
}

/// Result type alias for SegTune operations
pub type StResult<T> = Result<T, StError>;

impl TrainError {
    /// Early stopping is a normal outcome, not a failure.
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::StError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($key:expr, $($arg:tt)*) => {
        $crate::ConfigError::InvalidValue {
            key: $key.to_string(),
            message: format!($($arg)*),
        }
    };
}
