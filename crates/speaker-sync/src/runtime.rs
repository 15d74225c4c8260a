use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use speaker_sync_face::{FaceDetector, FaceLocator};
use speaker_sync_generator::{LipGenerator, NoopGenerator};

use crate::cli::{DetectorMode, GeneratorKind};
use crate::error::PipelineError;
use crate::settings::{ConfigError, EffectiveSettings};

/// The face model used to pick one box per frame.
#[derive(Clone)]
pub enum FaceModels {
    /// Detect and encode every face, keep the one matching the target speaker.
    Identity { locator: Arc<dyn FaceLocator> },
    /// Detect faces only, keep the highest-scoring one.
    Prominent { detector: Arc<dyn FaceDetector> },
    /// A fixed box was configured, no detection runs.
    Fixed,
}

impl FaceModels {
    pub fn name(&self) -> &'static str {
        match self {
            FaceModels::Identity { locator } => locator.name(),
            FaceModels::Prominent { detector } => detector.name(),
            FaceModels::Fixed => "fixed-box",
        }
    }
}

/// Models loaded once per run and shared by every stage.
#[derive(Clone)]
pub struct Runtime {
    pub faces: FaceModels,
    pub generator: Arc<dyn LipGenerator>,
}

impl Runtime {
    pub fn new(faces: FaceModels, generator: Arc<dyn LipGenerator>) -> Self {
        Self { faces, generator }
    }

    pub fn load(settings: &EffectiveSettings) -> Result<Self, PipelineError> {
        let faces = load_faces(settings)?;
        let generator = load_generator(settings)?;
        info!(
            faces = faces.name(),
            generator = generator.name(),
            "models loaded"
        );
        Ok(Self { faces, generator })
    }

    /// Runs a throwaway inference on every model so the first real frame
    /// does not pay the initialisation cost.
    pub fn warm_up(&self) -> Result<(), PipelineError> {
        match &self.faces {
            FaceModels::Identity { locator } => locator.warm_up()?,
            FaceModels::Prominent { detector } => detector.warm_up()?,
            FaceModels::Fixed => {}
        }
        self.generator.warm_up()?;
        debug!("models warmed up");
        Ok(())
    }
}

fn load_faces(settings: &EffectiveSettings) -> Result<FaceModels, PipelineError> {
    if settings.override_box.is_some() {
        return Ok(FaceModels::Fixed);
    }
    let detector_model = settings.detector_model.as_deref().ok_or(ConfigError::Missing {
        field: "detector_model",
        reason: "face detection needs a detector model unless --box is set",
    })?;
    match settings.detector_mode {
        DetectorMode::Prominent => Ok(FaceModels::Prominent {
            detector: onnx_detector(detector_model)?,
        }),
        DetectorMode::Identity => {
            let encoder_model = settings.encoder_model.as_deref().ok_or(ConfigError::Missing {
                field: "encoder_model",
                reason: "speaker identification needs a face encoder model",
            })?;
            Ok(FaceModels::Identity {
                locator: onnx_locator(detector_model, encoder_model)?,
            })
        }
    }
}

fn load_generator(settings: &EffectiveSettings) -> Result<Arc<dyn LipGenerator>, PipelineError> {
    match settings.generator {
        GeneratorKind::Noop => Ok(Arc::new(NoopGenerator)),
        GeneratorKind::Onnx => {
            let checkpoint = settings.checkpoint_path.as_deref().ok_or(ConfigError::Missing {
                field: "checkpoint_path",
                reason: "the onnx generator needs a model checkpoint",
            })?;
            onnx_generator(checkpoint)
        }
    }
}

#[cfg(feature = "engine-onnx")]
fn onnx_detector(model: &Path) -> Result<Arc<dyn FaceDetector>, PipelineError> {
    use speaker_sync_face::{OnnxDetectorConfig, OnnxFaceDetector};
    Ok(Arc::new(OnnxFaceDetector::new(OnnxDetectorConfig::new(model))?))
}

#[cfg(feature = "engine-onnx")]
fn onnx_locator(detector: &Path, encoder: &Path) -> Result<Arc<dyn FaceLocator>, PipelineError> {
    use speaker_sync_face::{
        OnnxDetectorConfig, OnnxEncoderConfig, OnnxFaceDetector, OnnxFaceEncoder, OnnxFaceLocator,
    };
    let detector = OnnxFaceDetector::new(OnnxDetectorConfig::new(detector))?;
    let encoder = OnnxFaceEncoder::new(OnnxEncoderConfig::new(encoder))?;
    Ok(Arc::new(OnnxFaceLocator::new(detector, encoder)))
}

#[cfg(feature = "engine-onnx")]
fn onnx_generator(checkpoint: &Path) -> Result<Arc<dyn LipGenerator>, PipelineError> {
    use speaker_sync_generator::{OnnxGenerator, OnnxGeneratorConfig};
    Ok(Arc::new(OnnxGenerator::new(OnnxGeneratorConfig::new(checkpoint))?))
}

#[cfg(not(feature = "engine-onnx"))]
fn onnx_detector(_model: &Path) -> Result<Arc<dyn FaceDetector>, PipelineError> {
    Err(onnx_unavailable())
}

#[cfg(not(feature = "engine-onnx"))]
fn onnx_locator(_detector: &Path, _encoder: &Path) -> Result<Arc<dyn FaceLocator>, PipelineError> {
    Err(onnx_unavailable())
}

#[cfg(not(feature = "engine-onnx"))]
fn onnx_generator(_checkpoint: &Path) -> Result<Arc<dyn LipGenerator>, PipelineError> {
    Err(onnx_unavailable())
}

#[cfg(not(feature = "engine-onnx"))]
fn onnx_unavailable() -> PipelineError {
    ConfigError::Unsupported("onnx models require the `engine-onnx` feature".into()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parse_cli_from;
    use crate::settings::resolve_settings;

    fn settings(extra: &[&str]) -> EffectiveSettings {
        let dir = tempfile::tempdir().unwrap();
        let face = dir.path().join("clip.mp4");
        let audio = dir.path().join("voice.wav");
        std::fs::write(&face, b"").unwrap();
        std::fs::write(&audio, b"").unwrap();
        let mut args = vec![
            "speaker-sync".to_string(),
            "--face".to_string(),
            face.to_string_lossy().into_owned(),
            "--audio".to_string(),
            audio.to_string_lossy().into_owned(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        let (cli, sources) = parse_cli_from(args).unwrap();
        resolve_settings(&cli, &sources).unwrap()
    }

    #[test]
    fn fixed_box_with_noop_generator_needs_no_models() {
        let settings = settings(&["--generator", "noop", "--box", "0", "8", "0", "8"]);
        let runtime = Runtime::load(&settings).unwrap();
        assert!(matches!(runtime.faces, FaceModels::Fixed));
        assert_eq!(runtime.faces.name(), "fixed-box");
        assert_eq!(runtime.generator.name(), NoopGenerator.name());
        runtime.warm_up().unwrap();
    }

    #[cfg(feature = "engine-onnx")]
    #[test]
    fn missing_detector_model_surfaces_as_error() {
        let settings = settings(&[
            "--generator",
            "noop",
            "--detector-mode",
            "prominent",
            "--detector-model",
            "/nonexistent/detector.onnx",
        ]);
        assert!(Runtime::load(&settings).is_err());
    }
}
