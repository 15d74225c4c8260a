use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use speaker_sync_decoder::RgbFrame;
use speaker_sync_generator::{BatchAssembler, LipGenerator, composite};

use crate::error::PipelineError;

/// Drives batches through the generator and pastes the output back.
///
/// Yields the composited frames of one batch at a time, in chunk order.
pub struct Synthesizer {
    batches: BatchAssembler,
    generator: Arc<dyn LipGenerator>,
    produced: usize,
}

impl Synthesizer {
    pub fn new(batches: BatchAssembler, generator: Arc<dyn LipGenerator>) -> Self {
        Self {
            batches,
            generator,
            produced: 0,
        }
    }

    pub fn frames_produced(&self) -> usize {
        self.produced
    }
}

impl Iterator for Synthesizer {
    type Item = Result<Vec<RgbFrame>, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = self.batches.next()?;
        let started = Instant::now();
        let result = self
            .generator
            .generate(batch.images.view(), batch.mels.view())
            .and_then(|patches| composite(&batch.frames, &batch.rects, patches.view()))
            .map_err(PipelineError::from);
        if let Ok(frames) = &result {
            self.produced += frames.len();
            debug!(
                entries = frames.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "batch synthesized"
            );
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.batches.size_hint()
    }
}

impl ExactSizeIterator for Synthesizer {}

#[cfg(test)]
mod tests {
    use ndarray::Array2;
    use speaker_sync_generator::{BatchConfig, NoopGenerator};
    use speaker_sync_types::CropRect;

    use super::*;

    fn frame(value: u8) -> RgbFrame {
        RgbFrame::from_owned(16, 16, None, vec![value; 16 * 16 * 3]).unwrap()
    }

    #[test]
    fn noop_generator_round_trips_frames() {
        let frames = vec![frame(40), frame(200)];
        let rects = vec![CropRect::new(4, 12, 4, 12); 2];
        let chunks = vec![Array2::<f32>::zeros((80, 16)); 5];
        let config = BatchConfig {
            batch_size: 2,
            img_size: 8,
            static_mode: false,
        };
        let assembler = BatchAssembler::new(frames, rects, chunks, config).unwrap();
        let mut synth = Synthesizer::new(assembler, Arc::new(NoopGenerator));
        assert_eq!(synth.len(), 3);

        let batches: Vec<Vec<RgbFrame>> = synth.by_ref().map(|batch| batch.unwrap()).collect();
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert_eq!(synth.frames_produced(), 5);

        // Chunk i pairs with frame i % 2, and a uniform crop survives the
        // resize round trip unchanged apart from truncation.
        let flat: Vec<&RgbFrame> = batches.iter().flatten().collect();
        for (index, out) in flat.iter().enumerate() {
            let expected = if index % 2 == 0 { 40 } else { 200 };
            let pixel = out.to_image().get_pixel(8, 8).0;
            assert!(pixel.iter().all(|&v| (v as i32 - expected).abs() <= 1), "{pixel:?}");
            assert_eq!(out.to_image().get_pixel(0, 0).0, [expected as u8; 3]);
        }
    }
}
