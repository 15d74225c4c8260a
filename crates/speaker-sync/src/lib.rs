//! Speaker-targeted lip-sync: decode a face video, find one enrolled speaker
//! in every frame, and regenerate their mouth region to match a new audio
//! track.

pub mod cli;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod runtime;
pub mod settings;
pub mod stage;

pub use error::PipelineError;
pub use pipeline::{Stage, run};
pub use runtime::{FaceModels, Runtime};
pub use settings::{ConfigError, EffectiveSettings, resolve_settings};
