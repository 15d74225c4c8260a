use std::path::PathBuf;

use thiserror::Error;

use speaker_sync_audio::AudioError;
use speaker_sync_decoder::FrameError;
use speaker_sync_face::FaceError;
use speaker_sync_generator::GeneratorError;

use crate::media::MediaError;
use crate::settings::ConfigError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Face(#[from] FaceError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("face not detected in frame {frame_index}; frame saved to {}", .dump.display())]
    FaceNotDetected { frame_index: usize, dump: PathBuf },

    #[error("input {} produced no frames", .0.display())]
    NoFrames(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
