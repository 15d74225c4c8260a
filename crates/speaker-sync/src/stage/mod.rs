pub mod synthesis;
pub mod tracking;

pub use synthesis::Synthesizer;
pub use tracking::{FaceSource, TrackingConfig, track_faces};
