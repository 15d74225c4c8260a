pub mod ffmpeg_cli;
pub mod mock;
pub mod still;

#[cfg(feature = "backend-ffmpeg")]
pub mod ffmpeg;
