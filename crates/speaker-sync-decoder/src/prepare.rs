use image::imageops::{self, FilterType};

use speaker_sync_types::{FrameError, FrameResult, RgbFrame};

/// Crop applied to every decoded video frame, `(top, bottom, left, right)`.
/// `-1` on the bottom or right edge means "up to the frame edge"; other
/// negative values count back from the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCrop {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
}

impl Default for FrameCrop {
    fn default() -> Self {
        Self {
            top: 0,
            bottom: -1,
            left: 0,
            right: -1,
        }
    }
}

impl FrameCrop {
    pub fn is_full_frame(&self) -> bool {
        *self == Self::default()
    }

    fn resolve(&self, width: u32, height: u32) -> FrameResult<(u32, u32, u32, u32)> {
        let y1 = resolve_edge(self.top, height, false);
        let y2 = resolve_edge(self.bottom, height, true);
        let x1 = resolve_edge(self.left, width, false);
        let x2 = resolve_edge(self.right, width, true);
        if y2 <= y1 || x2 <= x1 {
            return Err(FrameError::configuration(format!(
                "crop ({}, {}, {}, {}) leaves an empty {}x{} frame",
                self.top, self.bottom, self.left, self.right, width, height
            )));
        }
        Ok((y1, y2, x1, x2))
    }
}

fn resolve_edge(value: i32, dimension: u32, is_end: bool) -> u32 {
    let dimension_i = i64::from(dimension);
    let resolved = if is_end && value == -1 {
        dimension_i
    } else if value < 0 {
        dimension_i + i64::from(value)
    } else {
        i64::from(value)
    };
    resolved.clamp(0, dimension_i) as u32
}

/// Per-frame geometry normalisation applied to video input: rescale to a
/// fixed output height, optional 90° clockwise rotation, then crop.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FramePreparer {
    pub out_height: Option<u32>,
    pub rotate: bool,
    pub crop: FrameCrop,
}

impl FramePreparer {
    pub fn is_identity(&self) -> bool {
        self.out_height.is_none() && !self.rotate && self.crop.is_full_frame()
    }

    pub fn apply(&self, frame: RgbFrame) -> FrameResult<RgbFrame> {
        if self.is_identity() {
            return Ok(frame);
        }
        let index = frame.frame_index();
        let timestamp = frame.timestamp();
        let mut image = frame.to_image();

        if let Some(out_height) = self.out_height.filter(|h| *h > 0) {
            let (width, height) = image.dimensions();
            if height != out_height && height > 0 {
                let aspect = width as f64 / height as f64;
                let out_width = ((out_height as f64 * aspect) as u32).max(1);
                image = imageops::resize(&image, out_width, out_height, FilterType::Triangle);
            }
        }

        if self.rotate {
            image = imageops::rotate90(&image);
        }

        if !self.crop.is_full_frame() {
            let (width, height) = image.dimensions();
            let (y1, y2, x1, x2) = self.crop.resolve(width, height)?;
            image = imageops::crop_imm(&image, x1, y1, x2 - x1, y2 - y1).to_image();
        }

        Ok(RgbFrame::from_image(image)
            .with_frame_index(index)
            .with_timestamp(timestamp))
    }
}
