//! Shared domain models for the speaker-sync workspace.
//!
//! This crate centralizes lightweight data structures used across decoder,
//! face, audio, generator, and CLI crates. Keep it backend-agnostic and avoid
//! model or codec dependencies so every crate can depend on it cheaply.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use image::{RgbImage, imageops};
use thiserror::Error;

pub type FrameResult<T> = Result<T, FrameError>;

const CHANNELS: usize = 3;

/// Packed RGB24 frame as produced by the decoder backends.
#[derive(Clone)]
pub struct RgbFrame {
    width: u32,
    height: u32,
    frame_index: Option<u64>,
    timestamp: Option<Duration>,
    data: Arc<[u8]>,
}

impl fmt::Debug for RgbFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RgbFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl RgbFrame {
    pub fn from_owned(
        width: u32,
        height: u32,
        timestamp: Option<Duration>,
        data: Vec<u8>,
    ) -> FrameResult<Self> {
        let required = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(CHANNELS))
            .ok_or_else(|| FrameError::InvalidFrame {
                reason: "calculated RGB buffer length overflowed".into(),
            })?;
        if data.len() != required {
            return Err(FrameError::InvalidFrame {
                reason: format!(
                    "RGB buffer holds {} bytes, expected exactly {}",
                    data.len(),
                    required
                ),
            });
        }
        Ok(Self {
            width,
            height,
            timestamp,
            data: Arc::from(data.into_boxed_slice()),
            frame_index: None,
        })
    }

    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            timestamp: None,
            data: Arc::from(image.into_raw().into_boxed_slice()),
            frame_index: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn frame_index(&self) -> Option<u64> {
        self.frame_index
    }

    pub fn with_frame_index(mut self, index: Option<u64>) -> Self {
        self.frame_index = index;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Option<Duration>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Copies the frame into an owned image buffer.
    pub fn to_image(&self) -> RgbImage {
        // Length is validated on construction.
        RgbImage::from_raw(self.width, self.height, self.data.to_vec())
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    /// Extracts the pixels covered by `rect`. The rectangle must already be
    /// clamped to the frame bounds.
    pub fn crop(&self, rect: &CropRect) -> RgbImage {
        let image = self.to_image();
        imageops::crop_imm(&image, rect.x1, rect.y1, rect.width(), rect.height()).to_image()
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("backend {backend} is not supported in this build")]
    Unsupported { backend: &'static str },

    #[error("{backend} backend failed: {message}")]
    BackendFailure {
        backend: &'static str,
        message: String,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    pub fn unsupported(backend: &'static str) -> Self {
        Self::Unsupported { backend }
    }

    pub fn backend_failure(backend: &'static str, message: impl Into<String>) -> Self {
        Self::BackendFailure {
            backend,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Face location in pixel coordinates, `(top, right, bottom, left)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl FaceBox {
    pub fn new(top: i32, right: i32, bottom: i32, left: i32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    pub fn area(&self) -> i64 {
        i64::from(self.width()) * i64::from(self.height())
    }

    /// Intersection over union with another box, 0.0 when either is empty.
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let top = self.top.max(other.top);
        let left = self.left.max(other.left);
        let bottom = self.bottom.min(other.bottom);
        let right = self.right.min(other.right);
        let inter = i64::from((right - left).max(0)) * i64::from((bottom - top).max(0));
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            0.0
        } else {
            inter as f32 / union as f32
        }
    }
}

/// Per-side padding applied around a detected face, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pads {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Pads {
    pub fn new(top: u32, bottom: u32, left: u32, right: u32) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }
}

impl Default for Pads {
    fn default() -> Self {
        Self::new(0, 10, 0, 0)
    }
}

/// Face crop rectangle clamped to the frame, `(y1, y2, x1, x2)` with
/// exclusive upper bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub y1: u32,
    pub y2: u32,
    pub x1: u32,
    pub x2: u32,
}

impl CropRect {
    pub fn new(y1: u32, y2: u32, x1: u32, x2: u32) -> Self {
        Self { y1, y2, x1, x2 }
    }

    /// Expands `face` by `pads` and clamps every edge to `[0, dimension]`.
    pub fn from_face_box(face: &FaceBox, pads: Pads, width: u32, height: u32) -> Self {
        let clamp = |value: i64, max: u32| value.clamp(0, i64::from(max)) as u32;
        let y1 = clamp(i64::from(face.top) - i64::from(pads.top), height);
        let y2 = clamp(i64::from(face.bottom) + i64::from(pads.bottom), height);
        let x1 = clamp(i64::from(face.left) - i64::from(pads.left), width);
        let x2 = clamp(i64::from(face.right) + i64::from(pads.right), width);
        Self {
            y1,
            y2: y2.max(y1),
            x1,
            x2: x2.max(x1),
        }
    }

    /// Clamps an externally supplied rectangle to the frame bounds.
    pub fn clamped(self, width: u32, height: u32) -> Self {
        let y1 = self.y1.min(height);
        let x1 = self.x1.min(width);
        Self {
            y1,
            y2: self.y2.min(height).max(y1),
            x1,
            x2: self.x2.min(width).max(x1),
        }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn as_array(&self) -> [u32; 4] {
        [self.y1, self.y2, self.x1, self.x2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_short_buffer() {
        let err = RgbFrame::from_owned(2, 2, None, vec![0; 11]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidFrame { .. }));
    }

    #[test]
    fn frame_crop_extracts_region() {
        let mut data = vec![0u8; 4 * 3 * 3];
        // pixel (x=2, y=1)
        let offset = (4 + 2) * 3;
        data[offset..offset + 3].copy_from_slice(&[9, 8, 7]);
        let frame = RgbFrame::from_owned(4, 3, None, data).unwrap();
        let crop = frame.crop(&CropRect::new(1, 3, 2, 4));
        assert_eq!(crop.dimensions(), (2, 2));
        assert_eq!(crop.get_pixel(0, 0).0, [9, 8, 7]);
    }

    #[test]
    fn padding_is_clamped_to_frame() {
        let face = FaceBox::new(5, 95, 70, 3);
        let rect = CropRect::from_face_box(&face, Pads::new(10, 10, 10, 10), 100, 75);
        assert_eq!(rect, CropRect::new(0, 75, 0, 100));
    }

    #[test]
    fn padding_extends_inside_bounds() {
        let face = FaceBox::new(20, 60, 50, 30);
        let rect = CropRect::from_face_box(&face, Pads::default(), 100, 100);
        assert_eq!(rect, CropRect::new(20, 60, 30, 60));
        assert_eq!(rect.width(), 30);
        assert_eq!(rect.height(), 40);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let face = FaceBox::new(0, 10, 10, 0);
        assert!((face.iou(&face) - 1.0).abs() < f32::EPSILON);
        assert_eq!(face.iou(&FaceBox::new(20, 30, 30, 20)), 0.0);
    }
}
