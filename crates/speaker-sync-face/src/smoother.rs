use speaker_sync_types::CropRect;

pub const DEFAULT_SMOOTHING_WINDOW: usize = 5;

/// Averages each rectangle with the `window - 1` rectangles after it.
///
/// Near the end of the sequence the window stops sliding and every remaining
/// index uses the same final slice. Means are truncated toward zero.
pub fn smooth_boxes(boxes: &[CropRect], window: usize) -> Vec<CropRect> {
    let len = boxes.len();
    let window = window.max(1).min(len.max(1));
    (0..len)
        .map(|index| {
            let start = if index + window > len {
                len - window
            } else {
                index
            };
            mean_rect(&boxes[start..start + window])
        })
        .collect()
}

fn mean_rect(slice: &[CropRect]) -> CropRect {
    let count = slice.len() as u64;
    let mut sums = [0u64; 4];
    for rect in slice {
        for (sum, value) in sums.iter_mut().zip(rect.as_array()) {
            *sum += u64::from(value);
        }
    }
    let [y1, y2, x1, x2] = sums.map(|sum| (sum / count) as u32);
    CropRect::new(y1, y2, x1, x2)
}
