use ndarray::{Array4, ArrayView4, s};

use crate::error::GeneratorError;

/// Common interface for lip-sync generators.
///
/// `images` is `(N, S, S, 6)` with the masked crop in channels `0..3` and the
/// reference crop in `3..6`; `mels` is `(N, 80, 16, 1)`. The result is
/// `(N, S, S, 3)` in `[0, 1]`, one patch per input in the same order.
pub trait LipGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    fn warm_up(&self) -> Result<(), GeneratorError> {
        Ok(())
    }

    fn generate(
        &self,
        images: ArrayView4<'_, f32>,
        mels: ArrayView4<'_, f32>,
    ) -> Result<Array4<f32>, GeneratorError>;
}

/// Returns the unmasked reference crop unchanged; useful for dry runs.
#[derive(Debug, Default)]
pub struct NoopGenerator;

impl LipGenerator for NoopGenerator {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn generate(
        &self,
        images: ArrayView4<'_, f32>,
        mels: ArrayView4<'_, f32>,
    ) -> Result<Array4<f32>, GeneratorError> {
        if images.shape()[3] != 6 {
            return Err(GeneratorError::Shape(format!(
                "expected 6 image channels, got {:?}",
                images.shape()
            )));
        }
        if images.shape()[0] != mels.shape()[0] {
            return Err(GeneratorError::BatchMismatch {
                expected: images.shape()[0],
                got: mels.shape()[0],
            });
        }
        Ok(images.slice(s![.., .., .., 3..6]).to_owned())
    }
}
