use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;
use image::imageops::{self, FilterType};
use ndarray::{Array4, CowArray, IxDyn};
use ort::environment::Environment;
use ort::error::OrtError;
use ort::session::{Session, SessionBuilder};
use ort::value::Value;
use speaker_sync_types::FaceBox;
use tracing::debug;

use crate::embedding::Embedding;
use crate::error::FaceError;
use crate::locator::{DetectedFace, FaceDetector, FaceLocator, FrameCandidate};

/// One ONNX Runtime environment and session per loaded model file.
#[derive(Debug)]
struct ModelHandle {
    _environment: Arc<Environment>,
    session: Session,
}

impl ModelHandle {
    fn load(path: &Path) -> Result<Self, FaceError> {
        if !path.exists() {
            return Err(FaceError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }
        let environment = Environment::builder()
            .with_name("speaker-sync-face")
            .build()
            .map_err(|err| map_ort_error(err, "failed to initialise ONNX runtime environment"))?;
        let environment = Arc::new(environment);
        let session = SessionBuilder::new(&environment)
            .map_err(|err| map_ort_error(err, "failed to load ONNX model"))?
            .with_model_from_file(path)
            .map_err(|err| map_ort_error(err, "failed to load ONNX model"))?;
        debug!(path = %path.display(), "loaded face model");
        Ok(Self {
            _environment: environment,
            session,
        })
    }
}

fn run_model(
    handle: &ModelHandle,
    input: &Array4<f32>,
) -> Result<Vec<(Vec<f32>, Vec<usize>)>, FaceError> {
    let session = &handle.session;
    let allocator = session.allocator();
    let input_dyn: CowArray<'_, f32, IxDyn> = CowArray::from(input.view().into_dyn());
    let tensor = Value::from_array(allocator, &input_dyn)
        .map_err(|err| FaceError::backend(format!("failed to prepare ONNX input: {err}")))?;
    let outputs = session
        .run(vec![tensor])
        .map_err(|err| FaceError::backend(format!("ONNX inference failed: {err}")))?;
    outputs
        .into_iter()
        .map(|value| {
            let tensor = value
                .try_extract::<f32>()
                .map_err(|err| FaceError::backend(format!("ONNX inference failed: {err}")))?;
            let view = tensor.view();
            Ok((view.iter().copied().collect(), view.shape().to_vec()))
        })
        .collect()
}

fn map_ort_error(err: OrtError, context: &str) -> FaceError {
    FaceError::backend(format!("{context}: {err}"))
}

/// Resizes `image` to `width x height` and lays it out as a `1x3xHxW` tensor,
/// each channel value mapped through `normalize`.
fn image_tensor(
    image: &RgbImage,
    width: u32,
    height: u32,
    normalize: impl Fn(u8) -> f32,
) -> Result<Array4<f32>, FaceError> {
    let resized = if image.dimensions() == (width, height) {
        image.clone()
    } else {
        imageops::resize(image, width, height, FilterType::Triangle)
    };
    let area = (width * height) as usize;
    let mut data = vec![0.0f32; area * 3];
    for (index, pixel) in resized.pixels().enumerate() {
        for channel in 0..3 {
            data[channel * area + index] = normalize(pixel.0[channel]);
        }
    }
    Array4::from_shape_vec((1, 3, height as usize, width as usize), data)
        .map_err(|err| FaceError::backend(format!("failed to build ONNX input tensor: {err}")))
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnnxDetectorConfig {
    pub model_path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
    pub score_threshold: f32,
    pub iou_threshold: f32,
}

impl OnnxDetectorConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            input_width: 320,
            input_height: 240,
            score_threshold: 0.7,
            iou_threshold: 0.3,
        }
    }
}

/// Single-shot face detector emitting per-anchor `scores [1, N, 2]` and
/// normalised corner `boxes [1, N, 4]`.
#[derive(Debug)]
pub struct OnnxFaceDetector {
    model: ModelHandle,
    config: OnnxDetectorConfig,
}

impl OnnxFaceDetector {
    pub fn new(config: OnnxDetectorConfig) -> Result<Self, FaceError> {
        let model = ModelHandle::load(&config.model_path)?;
        Ok(Self { model, config })
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn name(&self) -> &'static str {
        "onnx_detector"
    }

    fn warm_up(&self) -> Result<(), FaceError> {
        let blank = RgbImage::new(self.config.input_width, self.config.input_height);
        self.detect(&blank).map(|_| ())
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, FaceError> {
        let input = image_tensor(
            image,
            self.config.input_width,
            self.config.input_height,
            |value| (f32::from(value) - 127.0) / 128.0,
        )?;
        let outputs = run_model(&self.model, &input)?;
        let [(scores, _), (boxes, _)] = outputs.as_slice() else {
            return Err(FaceError::backend(format!(
                "face detector produced {} outputs, expected scores and boxes",
                outputs.len()
            )));
        };
        let detections = decode_detections(
            scores,
            boxes,
            image.width(),
            image.height(),
            self.config.score_threshold,
        )?;
        Ok(non_max_suppression(detections, self.config.iou_threshold))
    }
}

fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    width: u32,
    height: u32,
    threshold: f32,
) -> Result<Vec<DetectedFace>, FaceError> {
    if scores.len() % 2 != 0 || boxes.len() % 4 != 0 || scores.len() / 2 != boxes.len() / 4 {
        return Err(FaceError::backend(format!(
            "face detector output mismatch: {} scores for {} boxes",
            scores.len(),
            boxes.len()
        )));
    }
    let scale = |value: f32, max: u32| ((value * max as f32).round() as i32).clamp(0, max as i32);
    Ok(scores
        .chunks_exact(2)
        .zip(boxes.chunks_exact(4))
        .filter(|(score, _)| score[1] > threshold)
        .map(|(score, corners)| DetectedFace {
            face_box: FaceBox::new(
                scale(corners[1], height),
                scale(corners[2], width),
                scale(corners[3], height),
                scale(corners[0], width),
            ),
            score: score[1],
        })
        .filter(|face| face.face_box.area() > 0)
        .collect())
}

/// Greedy suppression; survivors are ordered by descending score.
fn non_max_suppression(mut faces: Vec<DetectedFace>, iou_threshold: f32) -> Vec<DetectedFace> {
    faces.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<DetectedFace> = Vec::with_capacity(faces.len());
    for face in faces {
        if kept
            .iter()
            .all(|other| other.face_box.iou(&face.face_box) <= iou_threshold)
        {
            kept.push(face);
        }
    }
    kept
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnnxEncoderConfig {
    pub model_path: PathBuf,
    pub input_size: u32,
}

impl OnnxEncoderConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            input_size: 150,
        }
    }
}

/// Maps an aligned face crop to an identity embedding.
#[derive(Debug)]
pub struct OnnxFaceEncoder {
    model: ModelHandle,
    config: OnnxEncoderConfig,
}

impl OnnxFaceEncoder {
    pub fn new(config: OnnxEncoderConfig) -> Result<Self, FaceError> {
        let model = ModelHandle::load(&config.model_path)?;
        Ok(Self { model, config })
    }

    pub fn embed(&self, face: &RgbImage) -> Result<Embedding, FaceError> {
        let size = self.config.input_size;
        let input = image_tensor(face, size, size, |value| f32::from(value) / 255.0)?;
        let outputs = run_model(&self.model, &input)?;
        let (values, _) = outputs
            .into_iter()
            .next()
            .ok_or_else(|| FaceError::backend("face encoder produced no output"))?;
        Embedding::new(values)
    }
}

/// Detector plus encoder: every detected face is cropped and embedded.
#[derive(Debug)]
pub struct OnnxFaceLocator {
    detector: OnnxFaceDetector,
    encoder: OnnxFaceEncoder,
}

impl OnnxFaceLocator {
    pub fn new(detector: OnnxFaceDetector, encoder: OnnxFaceEncoder) -> Self {
        Self { detector, encoder }
    }
}

impl FaceLocator for OnnxFaceLocator {
    fn name(&self) -> &'static str {
        "onnx_locator"
    }

    fn warm_up(&self) -> Result<(), FaceError> {
        self.detector.warm_up()?;
        let size = self.encoder.config.input_size;
        self.encoder.embed(&RgbImage::new(size, size)).map(|_| ())
    }

    fn locate(&self, image: &RgbImage) -> Result<Vec<FrameCandidate>, FaceError> {
        let mut candidates = Vec::new();
        for face in self.detector.detect(image)? {
            let b = face.face_box;
            let crop = imageops::crop_imm(
                image,
                b.left as u32,
                b.top as u32,
                b.width() as u32,
                b.height() as u32,
            )
            .to_image();
            let embedding = self.encoder.embed(&crop)?;
            candidates.push(FrameCandidate::new(b, embedding));
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detections_are_thresholded_and_scaled() {
        let scores = [0.9, 0.1, 0.2, 0.8, 0.5, 0.5];
        let boxes = [
            0.0, 0.0, 1.0, 1.0, //
            0.25, 0.5, 0.75, 1.0, //
            0.0, 0.0, 0.5, 0.5,
        ];
        let faces = decode_detections(&scores, &boxes, 200, 100, 0.7).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].face_box, FaceBox::new(50, 150, 100, 50));
        assert!((faces[0].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn mismatched_outputs_are_rejected() {
        assert!(decode_detections(&[0.1, 0.9], &[0.0; 8], 10, 10, 0.5).is_err());
    }

    #[test]
    fn overlapping_boxes_are_suppressed() {
        let face = |left: i32, score: f32| DetectedFace {
            face_box: FaceBox::new(0, left + 10, 10, left),
            score,
        };
        let kept = non_max_suppression(vec![face(0, 0.8), face(1, 0.95), face(40, 0.9)], 0.3);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].face_box.left, 1);
        assert_eq!(kept[1].face_box.left, 40);
    }

    #[test]
    fn tensor_is_channel_major() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(1, 0, image::Rgb([255, 127, 0]));
        let tensor = image_tensor(&image, 2, 1, |v| (f32::from(v) - 127.0) / 128.0).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
        assert!((tensor[[0, 0, 0, 1]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor[[0, 1, 0, 1]], 0.0);
        assert!((tensor[[0, 2, 0, 0]] + 127.0 / 128.0).abs() < 1e-6);
    }

    #[test]
    fn missing_model_is_reported() {
        let err = OnnxFaceDetector::new(OnnxDetectorConfig::new("/nonexistent/detector.onnx"))
            .err()
            .unwrap();
        assert!(matches!(err, FaceError::ModelNotFound { .. }));
    }
}
