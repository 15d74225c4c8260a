use image::imageops::{self, FilterType};
use ndarray::{Array2, Array4, s};
use speaker_sync_types::{CropRect, RgbFrame};

use crate::error::GeneratorError;

pub const DEFAULT_BATCH_SIZE: usize = 128;
pub const DEFAULT_IMG_SIZE: u32 = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub img_size: u32,
    /// Every audio chunk pairs with the first frame.
    pub static_mode: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            img_size: DEFAULT_IMG_SIZE,
            static_mode: false,
        }
    }
}

/// Model-ready tensors for up to `batch_size` audio chunks, plus the frames
/// and crop rectangles their output will be pasted into.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `(N, S, S, 6)`: masked crop then reference crop, scaled to `[0, 1]`.
    pub images: Array4<f32>,
    /// `(N, 80, 16, 1)`.
    pub mels: Array4<f32>,
    pub frames: Vec<RgbFrame>,
    pub rects: Vec<CropRect>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Single-pass producer of [`Batch`]es, one entry per mel chunk.
///
/// Chunk `i` pairs with frame `i % frames.len()`, or with frame 0 in static
/// mode. Every batch is full except possibly the last; once exhausted the
/// assembler yields nothing more.
#[derive(Debug)]
pub struct BatchAssembler {
    frames: Vec<RgbFrame>,
    rects: Vec<CropRect>,
    mel_chunks: std::vec::IntoIter<Array2<f32>>,
    config: BatchConfig,
    cursor: usize,
}

impl BatchAssembler {
    pub fn new(
        frames: Vec<RgbFrame>,
        rects: Vec<CropRect>,
        mel_chunks: Vec<Array2<f32>>,
        config: BatchConfig,
    ) -> Result<Self, GeneratorError> {
        if config.batch_size == 0 {
            return Err(GeneratorError::Configuration(
                "batch size must be at least 1".into(),
            ));
        }
        if config.img_size < 2 {
            return Err(GeneratorError::Configuration(format!(
                "image size {} is too small",
                config.img_size
            )));
        }
        if frames.is_empty() {
            return Err(GeneratorError::Configuration("no frames to batch".into()));
        }
        if frames.len() != rects.len() {
            return Err(GeneratorError::BatchMismatch {
                expected: frames.len(),
                got: rects.len(),
            });
        }
        if let Some(rect) = rects.iter().find(|rect| rect.is_empty()) {
            return Err(GeneratorError::Configuration(format!(
                "empty crop rectangle {:?}",
                rect.as_array()
            )));
        }
        if let Some(first) = mel_chunks.first() {
            if let Some(chunk) = mel_chunks.iter().find(|chunk| chunk.dim() != first.dim()) {
                return Err(GeneratorError::Shape(format!(
                    "mel chunks differ in shape: {:?} vs {:?}",
                    first.shape(),
                    chunk.shape()
                )));
            }
        }
        Ok(Self {
            frames,
            rects,
            mel_chunks: mel_chunks.into_iter(),
            config,
            cursor: 0,
        })
    }

    fn frame_slot(&self, chunk_index: usize) -> usize {
        if self.config.static_mode {
            0
        } else {
            chunk_index % self.frames.len()
        }
    }

    fn assemble(&self, start: usize, chunks: Vec<Array2<f32>>) -> Batch {
        let count = chunks.len();
        let size = self.config.img_size;
        let side = size as usize;
        let half = side / 2;
        let (mel_rows, mel_cols) = chunks[0].dim();

        let mut images = Array4::<f32>::zeros((count, side, side, 6));
        let mut mels = Array4::<f32>::zeros((count, mel_rows, mel_cols, 1));
        let mut frames = Vec::with_capacity(count);
        let mut rects = Vec::with_capacity(count);

        for (offset, chunk) in chunks.iter().enumerate() {
            let slot = self.frame_slot(start + offset);
            let frame = &self.frames[slot];
            let rect = self.rects[slot];
            let face = imageops::resize(&frame.crop(&rect), size, size, FilterType::Triangle);

            for (x, y, pixel) in face.enumerate_pixels() {
                let (row, col) = (y as usize, x as usize);
                for channel in 0..3 {
                    let value = f32::from(pixel.0[channel]) / 255.0;
                    if row < half {
                        images[[offset, row, col, channel]] = value;
                    }
                    images[[offset, row, col, channel + 3]] = value;
                }
            }
            mels.slice_mut(s![offset, .., .., 0]).assign(chunk);
            frames.push(frame.clone());
            rects.push(rect);
        }

        Batch {
            images,
            mels,
            frames,
            rects,
        }
    }
}

impl Iterator for BatchAssembler {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let chunks: Vec<Array2<f32>> = self
            .mel_chunks
            .by_ref()
            .take(self.config.batch_size)
            .collect();
        if chunks.is_empty() {
            return None;
        }
        let start = self.cursor;
        self.cursor += chunks.len();
        Some(self.assemble(start, chunks))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.mel_chunks.len().div_ceil(self.config.batch_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BatchAssembler {}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: u8, index: u64) -> RgbFrame {
        RgbFrame::from_owned(8, 8, None, vec![value; 8 * 8 * 3])
            .unwrap()
            .with_frame_index(Some(index))
    }

    fn chunks(count: usize) -> Vec<Array2<f32>> {
        (0..count)
            .map(|i| Array2::from_elem((80, 16), i as f32))
            .collect()
    }

    fn assembler(frame_count: usize, chunk_count: usize, config: BatchConfig) -> BatchAssembler {
        let frames = (0..frame_count)
            .map(|i| frame(10 * (i as u8 + 1), i as u64))
            .collect();
        let rects = vec![CropRect::new(0, 8, 0, 8); frame_count];
        BatchAssembler::new(frames, rects, chunks(chunk_count), config).unwrap()
    }

    fn config(batch_size: usize) -> BatchConfig {
        BatchConfig {
            batch_size,
            img_size: 4,
            static_mode: false,
        }
    }

    #[test]
    fn batches_are_full_except_last() {
        let batches = assembler(10, 10, config(4));
        assert_eq!(batches.len(), 3);
        let sizes: Vec<usize> = batches.map(|b| b.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let batches: Vec<_> = assembler(8, 8, config(4)).collect();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 4));
    }

    #[test]
    fn exhausted_assembler_stays_empty() {
        let mut batches = assembler(2, 2, config(4));
        assert!(batches.next().is_some());
        assert_eq!(batches.len(), 0);
        assert!(batches.next().is_none());
        assert!(batches.next().is_none());
    }

    #[test]
    fn tensors_have_expected_shapes_and_mask() {
        let batch = assembler(3, 3, config(8)).next().unwrap();
        assert_eq!(batch.images.shape(), &[3, 4, 4, 6]);
        assert_eq!(batch.mels.shape(), &[3, 80, 16, 1]);
        let expected = 10.0 / 255.0;
        for row in 0..4 {
            for channel in 0..3 {
                let masked = batch.images[[0, row, 1, channel]];
                let reference = batch.images[[0, row, 1, channel + 3]];
                assert!((reference - expected).abs() < 1e-6);
                if row >= 2 {
                    assert_eq!(masked, 0.0);
                } else {
                    assert!((masked - expected).abs() < 1e-6);
                }
            }
        }
        assert_eq!(batch.mels[[2, 0, 0, 0]], 2.0);
    }

    #[test]
    fn frames_cycle_when_audio_is_longer() {
        let batch = assembler(2, 5, config(8)).next().unwrap();
        let indices: Vec<_> = batch.frames.iter().map(|f| f.frame_index()).collect();
        assert_eq!(
            indices,
            vec![Some(0), Some(1), Some(0), Some(1), Some(0)]
        );
    }

    #[test]
    fn static_mode_reuses_first_frame() {
        let batch = assembler(
            3,
            3,
            BatchConfig {
                static_mode: true,
                ..config(8)
            },
        )
        .next()
        .unwrap();
        assert!(batch.frames.iter().all(|f| f.frame_index() == Some(0)));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let frames = vec![frame(1, 0)];
        let rects = vec![CropRect::new(0, 8, 0, 8)];
        assert!(BatchAssembler::new(frames.clone(), rects.clone(), chunks(1), config(0)).is_err());
        assert!(BatchAssembler::new(frames.clone(), Vec::new(), chunks(1), config(1)).is_err());
        assert!(
            BatchAssembler::new(frames, vec![CropRect::new(4, 4, 0, 8)], chunks(1), config(1))
                .is_err()
        );
        assert!(BatchAssembler::new(Vec::new(), Vec::new(), chunks(1), config(1)).is_err());
    }
}
