use thiserror::Error;

pub type AudioResult<T> = Result<T, AudioError>;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to read WAV audio: {0}")]
    Wav(#[from] hound::Error),

    #[error("audio contains no samples")]
    Empty,

    #[error("mel spectrogram contains a non-finite value at bin {bin}, column {column}")]
    NonFinite { bin: usize, column: usize },

    #[error("mel spectrogram has {columns} columns, at least {required} are required")]
    TooShort { columns: usize, required: usize },

    #[error("frame rate must be positive and finite, got {0}")]
    InvalidFps(f64),

    #[error("invalid mel configuration: {0}")]
    Configuration(String),
}
