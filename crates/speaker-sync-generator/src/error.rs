use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator returned {got} patches for a batch of {expected}")]
    BatchMismatch { expected: usize, got: usize },

    #[error("unexpected tensor shape: {0}")]
    Shape(String),

    #[error("invalid batch configuration: {0}")]
    Configuration(String),

    #[error("generator model file '{path}' does not exist")]
    ModelNotFound { path: PathBuf },

    #[error("backend error: {message}")]
    Backend { message: String },
}

impl GeneratorError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}
