//! Audio side of the pipeline: WAV loading, log-mel spectrogram extraction,
//! and slicing the spectrogram into one fixed-width window per video frame.

mod chunker;
mod error;
mod mel;
mod wav;

pub use chunker::{CHUNK_WIDTH, MAX_FPS, MEL_COLUMNS_PER_SECOND, MelChunker, align_frames};
pub use error::{AudioError, AudioResult};
pub use mel::{MelConfig, MelExtractor};
pub use wav::{SAMPLE_RATE, load_wav, read_wav, resample_linear};
