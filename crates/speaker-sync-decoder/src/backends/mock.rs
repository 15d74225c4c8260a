use std::time::Duration;

use tokio::sync::mpsc::Sender;

use speaker_sync_types::{FrameResult, RgbFrame};

use crate::core::{
    DynFrameProvider, FrameStream, FrameStreamProvider, VideoMetadata, spawn_stream_from_channel,
};

/// Synthetic frame source used by tests and dry runs.
#[derive(Debug, Clone)]
pub struct MockProvider {
    frame_count: usize,
    width: u32,
    height: u32,
    fps: f64,
    channel_capacity: usize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            frame_count: 30,
            width: 320,
            height: 240,
            fps: 25.0,
            channel_capacity: Self::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl MockProvider {
    const DEFAULT_CHANNEL_CAPACITY: usize = 8;

    pub fn new(frame_count: usize, width: u32, height: u32, fps: f64) -> Self {
        Self {
            frame_count,
            width,
            height,
            fps,
            ..Self::default()
        }
    }

    fn generate_frame(&self, index: usize) -> FrameResult<RgbFrame> {
        let row_bytes = self.width as usize * 3;
        let mut data = vec![0u8; row_bytes * self.height as usize];
        for (row, chunk) in data.chunks_mut(row_bytes).enumerate() {
            let value = ((index + row) % 256) as u8;
            chunk.fill(value);
        }
        let timestamp = Duration::from_secs_f64(index as f64 / self.fps);
        RgbFrame::from_owned(self.width, self.height, Some(timestamp), data)
            .map(|frame| frame.with_frame_index(Some(index as u64)))
    }

    fn emit_frames(&self, tx: Sender<FrameResult<RgbFrame>>) {
        for index in 0..self.frame_count {
            if tx.blocking_send(self.generate_frame(index)).is_err() {
                break;
            }
        }
    }
}

impl FrameStreamProvider for MockProvider {
    fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            duration: Some(Duration::from_secs_f64(self.frame_count as f64 / self.fps)),
            fps: Some(self.fps),
            width: Some(self.width),
            height: Some(self.height),
            total_frames: Some(self.frame_count as u64),
        }
    }

    fn into_stream(self: Box<Self>) -> FrameStream {
        let provider = *self;
        let capacity = provider.channel_capacity;
        spawn_stream_from_channel(capacity, move |tx| provider.emit_frames(tx))
    }
}

pub fn boxed_mock(channel_capacity: Option<usize>) -> DynFrameProvider {
    let mut provider = MockProvider::default();
    if let Some(capacity) = channel_capacity {
        provider.channel_capacity = capacity.max(1);
    }
    Box::new(provider)
}
