//! Error types for the camera detection core

use thiserror::Error;

/// Result type alias for the detection core
pub type Result<T> = std::result::Result<T, DetectionError>;

/// Errors that can occur while configuring or running the frame pipeline
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("No model loaded: install a network before starting the processor")]
    ModelNotLoaded,

    #[error("Model lock poisoned: a thread panicked while holding the network")]
    ModelLockPoisoned,

    #[error("Inference failed: {0}")]
    InferenceError(String),

    #[error("Image preprocessing failed: {0}")]
    PreprocessingError(String),

    #[error("Detection postprocessing failed: {0}")]
    PostprocessingError(String),

    #[error("Processing cycle panicked: {0}")]
    CyclePanicked(String),

    #[error("Invalid input dimensions: expected {expected:?}, got {actual:?}")]
    InvalidDimensions {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Accelerated device {index} not available ({available} device(s) present)")]
    DeviceUnavailable { index: usize, available: usize },

    #[error("Device operation failed: {0}")]
    DeviceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Worker thread panicked")]
    WorkerPanicked,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl DetectionError {
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::InferenceError(msg.into())
    }

    pub fn preprocessing<S: Into<String>>(msg: S) -> Self {
        Self::PreprocessingError(msg.into())
    }

    pub fn postprocessing<S: Into<String>>(msg: S) -> Self {
        Self::PostprocessingError(msg.into())
    }

    pub fn device<S: Into<String>>(msg: S) -> Self {
        Self::DeviceError(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the worker loop must terminate instead of skipping the frame
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ModelLockPoisoned)
    }
}
