//! Generator-facing half of the pipeline: batching face crops with their mel
//! windows, running a lip-sync engine, and pasting its output back into the
//! source frames.

mod backends;
mod batch;
mod composite;
mod engine;
mod error;

#[cfg(feature = "engine-onnx")]
pub use backends::onnx::{OnnxGenerator, OnnxGeneratorConfig};
pub use batch::{Batch, BatchAssembler, BatchConfig, DEFAULT_BATCH_SIZE, DEFAULT_IMG_SIZE};
pub use composite::composite;
pub use engine::{LipGenerator, NoopGenerator};
pub use error::GeneratorError;
