use ndarray::{Array2, ArrayView2, s};

use crate::error::{AudioError, AudioResult};

/// Columns in every mel window handed to the generator.
pub const CHUNK_WIDTH: usize = 16;

/// Mel columns per second of audio at the extractor's hop length.
pub const MEL_COLUMNS_PER_SECOND: f64 = 80.0;

/// Highest frame rate the chunker accepts.
pub const MAX_FPS: f64 = 1000.0;

/// Walks a mel matrix in per-frame steps of `80 / fps` columns.
///
/// Each item is a `CHUNK_WIDTH`-column copy. Once a window would run past the
/// end, the last `CHUNK_WIDTH` columns are emitted and iteration stops.
#[derive(Debug, Clone)]
pub struct MelChunker<'a> {
    mel: ArrayView2<'a, f32>,
    step: f64,
    index: usize,
    finished: bool,
}

impl<'a> MelChunker<'a> {
    pub fn new(mel: &'a Array2<f32>, fps: f64) -> AudioResult<Self> {
        if !fps.is_finite() || fps <= 0.0 || fps > MAX_FPS {
            return Err(AudioError::InvalidFps(fps));
        }
        let columns = mel.ncols();
        if columns < CHUNK_WIDTH {
            return Err(AudioError::TooShort {
                columns,
                required: CHUNK_WIDTH,
            });
        }
        Ok(Self {
            mel: mel.view(),
            step: MEL_COLUMNS_PER_SECOND / fps,
            index: 0,
            finished: false,
        })
    }

    fn start_of(&self, index: usize) -> usize {
        (index as f64 * self.step) as usize
    }

    /// Whether the window for `index` fits inside the matrix.
    fn fits(&self, index: usize) -> bool {
        self.start_of(index)
            .checked_add(CHUNK_WIDTH)
            .is_some_and(|end| end <= self.mel.ncols())
    }

    /// Number of chunks a fresh chunker over the same matrix yields.
    pub fn chunk_count(&self) -> usize {
        let mut index = 0;
        while self.fits(index) {
            index += 1;
        }
        index + 1
    }
}

impl Iterator for MelChunker<'_> {
    type Item = Array2<f32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let columns = self.mel.ncols();
        if !self.fits(self.index) {
            self.finished = true;
            return Some(self.mel.slice(s![.., columns - CHUNK_WIDTH..]).to_owned());
        }
        let start = self.start_of(self.index);
        self.index += 1;
        Some(self.mel.slice(s![.., start..start + CHUNK_WIDTH]).to_owned())
    }
}

/// Drops trailing frames that have no matching audio chunk.
pub fn align_frames<T>(mut frames: Vec<T>, chunk_count: usize) -> Vec<T> {
    frames.truncate(chunk_count);
    frames
}
