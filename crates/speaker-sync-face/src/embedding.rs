use std::sync::Arc;

use crate::error::FaceError;

/// Fixed-length face descriptor produced by an encoder model.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    values: Arc<[f32]>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self, FaceError> {
        if values.is_empty() {
            return Err(FaceError::EmptyEmbedding);
        }
        Ok(Self {
            values: values.into(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Euclidean distance between two embeddings of the same dimension.
    pub fn distance(&self, other: &Embedding) -> Result<f32, FaceError> {
        if self.dimension() != other.dimension() {
            return Err(FaceError::DimensionMismatch {
                expected: self.dimension(),
                got: other.dimension(),
            });
        }
        let sum: f64 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| {
                let diff = f64::from(*a) - f64::from(*b);
                diff * diff
            })
            .sum();
        Ok(sum.sqrt() as f32)
    }
}

/// Maps a distance onto `(0, 1]`; identical embeddings score 1.
pub fn similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}
