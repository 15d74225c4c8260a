use std::pin::Pin;
use std::time::Duration;

use futures_core::Stream;
use futures_util::stream::unfold;
use tokio::sync::mpsc::{self, Sender};

use speaker_sync_types::{FrameResult, RgbFrame};

pub type FrameStream = Pin<Box<dyn Stream<Item = FrameResult<RgbFrame>> + Send>>;

pub type DynFrameProvider = Box<dyn FrameStreamProvider>;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoMetadata {
    pub duration: Option<Duration>,
    pub fps: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub total_frames: Option<u64>,
}

impl VideoMetadata {
    /// Frame count as reported, else estimated from duration and rate.
    pub fn calculate_total_frames(&self) -> Option<u64> {
        if let Some(total) = self.total_frames {
            return Some(total);
        }

        if let (Some(duration), Some(fps)) = (self.duration, self.fps) {
            let seconds = duration.as_secs_f64();
            let total = (seconds * fps).round();
            if total.is_finite() && total >= 0.0 {
                return Some(total as u64);
            }
        }

        None
    }
}

/// A source of decoded frames. Backends that do blocking work push frames
/// through [`spawn_stream_from_channel`].
pub trait FrameStreamProvider: Send + 'static {
    fn metadata(&self) -> VideoMetadata {
        VideoMetadata::default()
    }

    /// True when the source is a single still image rather than a video.
    fn is_still(&self) -> bool {
        false
    }

    fn into_stream(self: Box<Self>) -> FrameStream;
}

pub fn spawn_stream_from_channel(
    capacity: usize,
    task: impl FnOnce(Sender<FrameResult<RgbFrame>>) + Send + 'static,
) -> FrameStream {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::task::spawn_blocking(move || task(tx));
    let stream = unfold(rx, |mut receiver| async {
        receiver.recv().await.map(|item| (item, receiver))
    });
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn total_frames_falls_back_to_duration() {
        let metadata = VideoMetadata {
            duration: Some(Duration::from_secs(2)),
            fps: Some(25.0),
            ..VideoMetadata::default()
        };
        assert_eq!(metadata.calculate_total_frames(), Some(50));
        assert_eq!(VideoMetadata::default().calculate_total_frames(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn spawn_stream_from_channel_pushes_values() {
        let stream = spawn_stream_from_channel(2, move |tx| {
            let frame = RgbFrame::from_owned(1, 1, None, vec![1, 2, 3]);
            let _ = tx.blocking_send(frame);
        });
        let mut stream = stream;
        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(frame.data(), &[1, 2, 3]);
        assert!(stream.next().await.is_none());
    }
}
