use std::path::PathBuf;
use std::sync::Arc;

use ndarray::{Array4, ArrayView4, CowArray, IxDyn};
use ort::environment::Environment;
use ort::error::OrtError;
use ort::session::{Session, SessionBuilder};
use ort::value::Value;
use tracing::debug;

use crate::batch::DEFAULT_IMG_SIZE;
use crate::engine::LipGenerator;
use crate::error::GeneratorError;

#[derive(Debug, Clone, PartialEq)]
pub struct OnnxGeneratorConfig {
    pub model_path: PathBuf,
    pub img_size: u32,
    /// The released lip-sync checkpoints were trained on BGR crops.
    pub swap_red_blue: bool,
}

impl OnnxGeneratorConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            img_size: DEFAULT_IMG_SIZE,
            swap_red_blue: true,
        }
    }
}

/// Generator exported to ONNX with inputs `mel (N, 1, 80, 16)` and
/// `img (N, 6, S, S)`, producing `(N, 3, S, S)`.
#[derive(Debug)]
pub struct OnnxGenerator {
    _environment: Arc<Environment>,
    session: Session,
    config: OnnxGeneratorConfig,
}

impl OnnxGenerator {
    pub fn new(config: OnnxGeneratorConfig) -> Result<Self, GeneratorError> {
        if !config.model_path.exists() {
            return Err(GeneratorError::ModelNotFound {
                path: config.model_path.clone(),
            });
        }
        let environment = Environment::builder()
            .with_name("speaker-sync-generator")
            .build()
            .map_err(|err| map_ort_error(err, "failed to initialise ONNX runtime environment"))?;
        let environment = Arc::new(environment);
        let session = SessionBuilder::new(&environment)
            .map_err(|err| map_ort_error(err, "failed to load ONNX model"))?
            .with_model_from_file(&config.model_path)
            .map_err(|err| map_ort_error(err, "failed to load ONNX model"))?;
        debug!(path = %config.model_path.display(), "loaded generator model");
        Ok(Self {
            _environment: environment,
            session,
            config,
        })
    }
}

impl LipGenerator for OnnxGenerator {
    fn name(&self) -> &'static str {
        "onnx_generator"
    }

    fn warm_up(&self) -> Result<(), GeneratorError> {
        let side = self.config.img_size as usize;
        let images = Array4::<f32>::zeros((1, side, side, 6));
        let mels = Array4::<f32>::zeros((1, 80, 16, 1));
        self.generate(images.view(), mels.view()).map(|_| ())
    }

    fn generate(
        &self,
        images: ArrayView4<'_, f32>,
        mels: ArrayView4<'_, f32>,
    ) -> Result<Array4<f32>, GeneratorError> {
        let count = images.shape()[0];
        if mels.shape()[0] != count {
            return Err(GeneratorError::BatchMismatch {
                expected: count,
                got: mels.shape()[0],
            });
        }
        let image_order: [usize; 6] = if self.config.swap_red_blue {
            [2, 1, 0, 5, 4, 3]
        } else {
            [0, 1, 2, 3, 4, 5]
        };
        let img_input = to_channels_first(images, &image_order)?;
        let mel_input = mels.permuted_axes([0, 3, 1, 2]).as_standard_layout().to_owned();

        let allocator = self.session.allocator();
        let mel_dyn: CowArray<'_, f32, IxDyn> = CowArray::from(mel_input.view().into_dyn());
        let img_dyn: CowArray<'_, f32, IxDyn> = CowArray::from(img_input.view().into_dyn());
        let input_error =
            |err: OrtError| GeneratorError::backend(format!("failed to prepare ONNX input: {err}"));
        let mel_tensor = Value::from_array(allocator, &mel_dyn).map_err(input_error)?;
        let img_tensor = Value::from_array(allocator, &img_dyn).map_err(input_error)?;
        let outputs = self
            .session
            .run(vec![mel_tensor, img_tensor])
            .map_err(|err| GeneratorError::backend(format!("ONNX inference failed: {err}")))?;
        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| GeneratorError::backend("onnx generator produced no output"))?;
        let tensor = output
            .try_extract::<f32>()
            .map_err(|err| GeneratorError::backend(format!("ONNX inference failed: {err}")))?;
        let view = tensor.view();
        let shape = view.shape().to_vec();
        let [n, 3, h, w] = shape.as_slice() else {
            return Err(GeneratorError::Shape(format!(
                "generator output {shape:?}, expected (N, 3, S, S)"
            )));
        };
        if *n != count {
            return Err(GeneratorError::BatchMismatch {
                expected: count,
                got: *n,
            });
        }
        let data: Vec<f32> = view.iter().copied().collect();
        let planar = Array4::from_shape_vec((*n, 3, *h, *w), data)
            .map_err(|err| GeneratorError::Shape(err.to_string()))?;
        let output_order: [usize; 3] = if self.config.swap_red_blue {
            [2, 1, 0]
        } else {
            [0, 1, 2]
        };
        to_channels_last(planar.view(), &output_order)
    }
}

/// `(N, H, W, C)` to `(N, C, H, W)`, reading source channel `order[c]` into
/// output channel `c`.
fn to_channels_first(
    input: ArrayView4<'_, f32>,
    order: &[usize],
) -> Result<Array4<f32>, GeneratorError> {
    let (n, h, w, c) = input.dim();
    if c != order.len() {
        return Err(GeneratorError::Shape(format!(
            "expected {} channels, got {c}",
            order.len()
        )));
    }
    Ok(Array4::from_shape_fn((n, c, h, w), |(i, ch, y, x)| {
        input[[i, y, x, order[ch]]]
    }))
}

fn to_channels_last(
    input: ArrayView4<'_, f32>,
    order: &[usize],
) -> Result<Array4<f32>, GeneratorError> {
    let (n, c, h, w) = input.dim();
    if c != order.len() {
        return Err(GeneratorError::Shape(format!(
            "expected {} channels, got {c}",
            order.len()
        )));
    }
    Ok(Array4::from_shape_fn((n, h, w, c), |(i, y, x, ch)| {
        input[[i, order[ch], y, x]]
    }))
}

fn map_ort_error(err: OrtError, context: &str) -> GeneratorError {
    GeneratorError::backend(format!("{context}: {err}"))
}
