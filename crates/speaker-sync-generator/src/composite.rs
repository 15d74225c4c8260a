use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::ArrayView4;
use speaker_sync_types::{CropRect, RgbFrame};

use crate::error::GeneratorError;

/// Pastes each generated `(S, S, 3)` patch into a copy of its source frame,
/// resized to the crop rectangle it came from. Output keeps batch order.
pub fn composite(
    frames: &[RgbFrame],
    rects: &[CropRect],
    patches: ArrayView4<'_, f32>,
) -> Result<Vec<RgbFrame>, GeneratorError> {
    let (count, height, width, channels) = patches.dim();
    if channels != 3 {
        return Err(GeneratorError::Shape(format!(
            "expected 3 patch channels, got {:?}",
            patches.shape()
        )));
    }
    if count != frames.len() || rects.len() != frames.len() {
        return Err(GeneratorError::BatchMismatch {
            expected: frames.len(),
            got: count,
        });
    }

    let mut output = Vec::with_capacity(count);
    for (index, (frame, rect)) in frames.iter().zip(rects).enumerate() {
        let mut canvas = frame.to_image();
        if !rect.is_empty() {
            let patch = RgbImage::from_fn(width as u32, height as u32, |x, y| {
                let value = |c: usize| {
                    (patches[[index, y as usize, x as usize, c]] * 255.0).clamp(0.0, 255.0) as u8
                };
                Rgb([value(0), value(1), value(2)])
            });
            let resized =
                imageops::resize(&patch, rect.width(), rect.height(), FilterType::Triangle);
            imageops::replace(&mut canvas, &resized, i64::from(rect.x1), i64::from(rect.y1));
        }
        output.push(
            RgbFrame::from_image(canvas)
                .with_frame_index(frame.frame_index())
                .with_timestamp(frame.timestamp()),
        );
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use ndarray::Array4;

    use super::*;

    fn frame(index: u64) -> RgbFrame {
        RgbFrame::from_owned(6, 4, None, vec![0; 6 * 4 * 3])
            .unwrap()
            .with_frame_index(Some(index))
    }

    #[test]
    fn patch_overwrites_only_the_crop() {
        let patches = Array4::from_elem((1, 2, 2, 3), 1.0f32);
        let rect = CropRect::new(1, 3, 2, 5);
        let out = composite(&[frame(3)], &[rect], patches.view()).unwrap();
        let image = out[0].to_image();
        assert_eq!(out[0].frame_index(), Some(3));
        for (x, y, pixel) in image.enumerate_pixels() {
            let inside = (2..5).contains(&x) && (1..3).contains(&y);
            let expected = if inside { 255 } else { 0 };
            assert_eq!(pixel.0, [expected; 3], "pixel ({x}, {y})");
        }
    }

    #[test]
    fn values_are_scaled_and_clamped() {
        let mut patches = Array4::<f32>::zeros((1, 1, 1, 3));
        patches[[0, 0, 0, 0]] = 0.5;
        patches[[0, 0, 0, 1]] = 2.0;
        patches[[0, 0, 0, 2]] = -1.0;
        let out = composite(&[frame(0)], &[CropRect::new(0, 1, 0, 1)], patches.view()).unwrap();
        assert_eq!(out[0].to_image().get_pixel(0, 0).0, [127, 255, 0]);
    }

    #[test]
    fn patch_count_must_match() {
        let patches = Array4::<f32>::zeros((2, 2, 2, 3));
        let rect = CropRect::new(0, 2, 0, 2);
        assert!(matches!(
            composite(&[frame(0)], &[rect], patches.view()),
            Err(GeneratorError::BatchMismatch {
                expected: 1,
                got: 2
            })
        ));
    }
}
