//! Speaker localisation: enrollment of reference faces, per-frame identity
//! matching, temporal tracking, and box smoothing.
//!
//! The neural models are reached through the [`FaceLocator`] and
//! [`FaceDetector`] traits; everything else in this crate is deterministic
//! bookkeeping over their output.

mod backends;
mod embedding;
mod enroll;
mod error;
mod locator;
mod matcher;
mod smoother;
mod tracker;

#[cfg(feature = "engine-onnx")]
pub use backends::onnx::{
    OnnxDetectorConfig, OnnxEncoderConfig, OnnxFaceDetector, OnnxFaceEncoder, OnnxFaceLocator,
};
pub use embedding::{Embedding, similarity};
pub use enroll::{EnrollmentStore, NAME_SEPARATOR, ReferenceFace, parse_face_name};
pub use error::FaceError;
pub use locator::{DetectedFace, FaceDetector, FaceLocator, FrameCandidate, most_prominent};
pub use matcher::{DEFAULT_TOLERANCE, FrameDecision, MatchResult, SpeakerMatcher};
pub use smoother::{DEFAULT_SMOOTHING_WINDOW, smooth_boxes};
pub use tracker::TargetTracker;
