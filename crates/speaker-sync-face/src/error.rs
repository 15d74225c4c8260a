use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaceError {
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("embedding must not be empty")]
    EmptyEmbedding,

    #[error("face model file '{path}' does not exist")]
    ModelNotFound { path: PathBuf },

    #[error("failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("backend error: {message}")]
    Backend { message: String },
}

impl FaceError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}
