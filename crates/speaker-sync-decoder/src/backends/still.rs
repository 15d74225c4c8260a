use std::path::{Path, PathBuf};

use speaker_sync_types::{FrameError, FrameResult, RgbFrame};

use crate::core::{
    DynFrameProvider, FrameStream, FrameStreamProvider, VideoMetadata, spawn_stream_from_channel,
};

const BACKEND_NAME: &str = "still";

/// Decodes a single image file into a one-frame stream.
pub struct StillImageProvider {
    input: PathBuf,
    fps: f64,
}

impl StillImageProvider {
    pub fn open<P: AsRef<Path>>(path: P, fps: f64) -> FrameResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input file {} does not exist", path.display()),
            )));
        }
        Ok(Self {
            input: path.to_path_buf(),
            fps,
        })
    }

    fn decode(&self) -> FrameResult<RgbFrame> {
        let image = image::open(&self.input)
            .map_err(|err| FrameError::backend_failure(BACKEND_NAME, err.to_string()))?
            .to_rgb8();
        Ok(RgbFrame::from_image(image).with_frame_index(Some(0)))
    }
}

impl FrameStreamProvider for StillImageProvider {
    fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            fps: Some(self.fps),
            total_frames: Some(1),
            ..VideoMetadata::default()
        }
    }

    fn is_still(&self) -> bool {
        true
    }

    fn into_stream(self: Box<Self>) -> FrameStream {
        let provider = *self;
        spawn_stream_from_channel(1, move |tx| {
            let _ = tx.blocking_send(provider.decode());
        })
    }
}

pub fn boxed_still<P: AsRef<Path>>(path: P, fps: f64) -> FrameResult<DynFrameProvider> {
    Ok(Box::new(StillImageProvider::open(path, fps)?))
}
