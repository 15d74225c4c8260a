pub mod backends;
pub mod config;
pub mod core;
pub mod prepare;

pub use config::{Backend, Configuration};
pub use core::{
    DynFrameProvider, FrameStream, FrameStreamProvider, VideoMetadata, spawn_stream_from_channel,
};
pub use prepare::{FrameCrop, FramePreparer};
pub use speaker_sync_types::{FrameError, FrameResult, RgbFrame};
