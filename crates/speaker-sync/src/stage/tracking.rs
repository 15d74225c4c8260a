use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use speaker_sync_decoder::RgbFrame;
use speaker_sync_face::{
    DEFAULT_SMOOTHING_WINDOW, FaceDetector, FaceLocator, SpeakerMatcher, TargetTracker,
    smooth_boxes,
};
use speaker_sync_types::{CropRect, FaceBox, Pads};

use crate::error::PipelineError;
use crate::progress::{frame_bar_style, stage_bar};

const FAULTY_FRAME_NAME: &str = "faulty_frame.jpg";

/// Where per-frame face boxes come from.
pub enum FaceSource {
    Identity {
        locator: Arc<dyn FaceLocator>,
        matcher: SpeakerMatcher,
    },
    Prominent {
        detector: Arc<dyn FaceDetector>,
    },
    Fixed(CropRect),
}

#[derive(Debug, Clone)]
pub struct TrackingConfig {
    pub pads: Pads,
    pub smooth: bool,
    pub smooth_window: usize,
    pub temp_dir: PathBuf,
    pub show_progress: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            pads: Pads::default(),
            smooth: true,
            smooth_window: DEFAULT_SMOOTHING_WINDOW,
            temp_dir: PathBuf::from("temp"),
            show_progress: false,
        }
    }
}

/// Resolves one crop rectangle per frame.
///
/// Detected boxes are padded and clamped first, then smoothed over time. A
/// frame with no tracked face aborts the run after saving it for inspection.
pub fn track_faces(
    frames: &[RgbFrame],
    source: &FaceSource,
    config: &TrackingConfig,
) -> Result<Vec<CropRect>, PipelineError> {
    if let FaceSource::Fixed(rect) = source {
        return fixed_rects(frames, *rect, &config.temp_dir);
    }

    let bar = stage_bar(
        "faces",
        Some(frames.len() as u64),
        frame_bar_style(),
        !config.show_progress,
    );
    let mut tracker = TargetTracker::new();
    let mut rects = Vec::with_capacity(frames.len());
    for (index, frame) in frames.iter().enumerate() {
        let image = frame.to_image();
        let tracked = match source {
            FaceSource::Identity { locator, matcher } => {
                let candidates = locator.locate(&image)?;
                let decision = matcher.decide(&candidates)?;
                debug!(
                    frame = index,
                    candidates = candidates.len(),
                    ?decision,
                    "identity decision"
                );
                tracker.observe(decision)
            }
            FaceSource::Prominent { detector } => {
                let detections = detector.detect(&image)?;
                debug!(frame = index, detections = detections.len(), "detections");
                tracker.observe_detections(&detections)
            }
            // Resolved above without detection.
            FaceSource::Fixed(_) => tracker.last(),
        };
        let rect = tracked
            .map(|face: FaceBox| {
                CropRect::from_face_box(&face, config.pads, frame.width(), frame.height())
            })
            .filter(|rect| !rect.is_empty());
        let Some(rect) = rect else {
            bar.abandon_with_message(format!("no face in frame {index}"));
            return Err(face_not_detected(frame, index, &config.temp_dir));
        };
        rects.push(rect);
        bar.inc(1);
    }
    bar.finish_and_clear();

    if config.smooth {
        rects = smooth_boxes(&rects, config.smooth_window);
    }
    info!(frames = rects.len(), smoothed = config.smooth, "face boxes resolved");
    Ok(rects)
}

fn fixed_rects(
    frames: &[RgbFrame],
    rect: CropRect,
    temp_dir: &Path,
) -> Result<Vec<CropRect>, PipelineError> {
    let mut rects = Vec::with_capacity(frames.len());
    for (index, frame) in frames.iter().enumerate() {
        let clamped = rect.clamped(frame.width(), frame.height());
        if clamped.is_empty() {
            warn!(rect = ?rect.as_array(), frame = index, "fixed box lies outside the frame");
            return Err(face_not_detected(frame, index, temp_dir));
        }
        rects.push(clamped);
    }
    info!(frames = rects.len(), rect = ?rect.as_array(), "using fixed face box");
    Ok(rects)
}

/// Saves the offending frame and builds the fatal error for it. A failure to
/// save is logged; the detection error is what gets reported.
fn face_not_detected(frame: &RgbFrame, frame_index: usize, temp_dir: &Path) -> PipelineError {
    let dump = temp_dir.join(FAULTY_FRAME_NAME);
    let saved = std::fs::create_dir_all(temp_dir)
        .map_err(|err| err.to_string())
        .and_then(|()| frame.to_image().save(&dump).map_err(|err| err.to_string()));
    if let Err(err) = saved {
        warn!(path = %dump.display(), error = %err, "failed to save faulty frame");
    }
    PipelineError::FaceNotDetected { frame_index, dump }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use image::RgbImage;
    use speaker_sync_face::{DetectedFace, FaceError};

    use super::*;

    struct ScriptedDetector {
        frames: Mutex<VecDeque<Vec<DetectedFace>>>,
    }

    impl ScriptedDetector {
        fn new(script: Vec<Vec<DetectedFace>>) -> Self {
            Self {
                frames: Mutex::new(script.into()),
            }
        }
    }

    impl FaceDetector for ScriptedDetector {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectedFace>, FaceError> {
            Ok(self.frames.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    fn frames(count: usize) -> Vec<RgbFrame> {
        (0..count)
            .map(|index| {
                RgbFrame::from_owned(40, 30, None, vec![index as u8; 40 * 30 * 3])
                    .unwrap()
                    .with_frame_index(Some(index as u64))
            })
            .collect()
    }

    fn face(left: i32) -> DetectedFace {
        DetectedFace {
            face_box: FaceBox::new(5, left + 10, 15, left),
            score: 0.9,
        }
    }

    fn config(dir: &Path, smooth: bool) -> TrackingConfig {
        TrackingConfig {
            pads: Pads::new(0, 0, 0, 0),
            smooth,
            smooth_window: 2,
            temp_dir: dir.to_path_buf(),
            show_progress: false,
        }
    }

    #[test]
    fn prominent_mode_keeps_highest_scoring_face() {
        let dir = tempfile::tempdir().unwrap();
        let larger = DetectedFace {
            face_box: FaceBox::new(0, 30, 25, 0),
            score: 0.75,
        };
        let source = FaceSource::Prominent {
            detector: Arc::new(ScriptedDetector::new(vec![vec![face(0), larger]])),
        };
        let rects = track_faces(&frames(1), &source, &config(dir.path(), false)).unwrap();
        assert_eq!(rects, vec![CropRect::new(5, 15, 0, 10)]);
    }

    #[test]
    fn missing_detection_carries_previous_box() {
        let dir = tempfile::tempdir().unwrap();
        let source = FaceSource::Prominent {
            detector: Arc::new(ScriptedDetector::new(vec![vec![face(0)], vec![], vec![face(10)]])),
        };
        let rects = track_faces(&frames(3), &source, &config(dir.path(), false)).unwrap();
        assert_eq!(
            rects,
            vec![
                CropRect::new(5, 15, 0, 10),
                CropRect::new(5, 15, 0, 10),
                CropRect::new(5, 15, 10, 20),
            ]
        );
    }

    #[test]
    fn smoothing_runs_after_padding() {
        let dir = tempfile::tempdir().unwrap();
        let source = FaceSource::Prominent {
            detector: Arc::new(ScriptedDetector::new(vec![vec![face(0)], vec![face(10)]])),
        };
        let mut config = config(dir.path(), true);
        config.pads = Pads::new(0, 0, 4, 0);
        let rects = track_faces(&frames(2), &source, &config).unwrap();
        // Frame 0 pads to x1 = 0 (clamped), frame 1 to x1 = 6. The tail
        // window covers both frames, so both get the same mean.
        assert_eq!(rects, vec![CropRect::new(5, 15, 3, 15); 2]);
    }

    #[test]
    fn untracked_frame_is_dumped_and_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let source = FaceSource::Prominent {
            detector: Arc::new(ScriptedDetector::new(vec![vec![], vec![face(0)]])),
        };
        let err = track_faces(&frames(2), &source, &config(dir.path(), true)).unwrap_err();
        match err {
            PipelineError::FaceNotDetected { frame_index, dump } => {
                assert_eq!(frame_index, 0);
                assert_eq!(dump, dir.path().join(FAULTY_FRAME_NAME));
                assert!(dump.exists());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn fixed_box_is_clamped_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let source = FaceSource::Fixed(CropRect::new(10, 100, 20, 35));
        let rects = track_faces(&frames(2), &source, &config(dir.path(), true)).unwrap();
        assert_eq!(rects, vec![CropRect::new(10, 30, 20, 35); 2]);
    }

    #[test]
    fn fixed_box_outside_frame_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let source = FaceSource::Fixed(CropRect::new(50, 60, 0, 10));
        let err = track_faces(&frames(1), &source, &config(dir.path(), false)).unwrap_err();
        assert!(matches!(err, PipelineError::FaceNotDetected { frame_index: 0, .. }));
    }
}
