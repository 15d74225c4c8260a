use image::RgbImage;
use speaker_sync_types::FaceBox;

use crate::embedding::Embedding;
use crate::error::FaceError;

/// A face found in one frame together with its identity descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameCandidate {
    pub face_box: FaceBox,
    pub embedding: Embedding,
}

impl FrameCandidate {
    pub fn new(face_box: FaceBox, embedding: Embedding) -> Self {
        Self {
            face_box,
            embedding,
        }
    }
}

/// A face found without identity information.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedFace {
    pub face_box: FaceBox,
    pub score: f32,
}

/// Finds every face in an image and describes each one.
pub trait FaceLocator: Send + Sync {
    fn name(&self) -> &'static str;

    fn warm_up(&self) -> Result<(), FaceError> {
        Ok(())
    }

    fn locate(&self, image: &RgbImage) -> Result<Vec<FrameCandidate>, FaceError>;
}

/// Finds faces only; results are ordered by descending score.
pub trait FaceDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn warm_up(&self) -> Result<(), FaceError> {
        Ok(())
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, FaceError>;
}

/// Largest candidate by box area; the first one wins ties.
pub fn most_prominent(candidates: &[FrameCandidate]) -> Option<&FrameCandidate> {
    candidates.iter().fold(None, |best, candidate| match best {
        Some(current) if current.face_box.area() >= candidate.face_box.area() => Some(current),
        _ => Some(candidate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(size: i32, tag: f32) -> FrameCandidate {
        FrameCandidate::new(
            FaceBox::new(0, size, size, 0),
            Embedding::new(vec![tag]).unwrap(),
        )
    }

    #[test]
    fn largest_face_is_prominent() {
        let faces = vec![candidate(10, 1.0), candidate(30, 2.0), candidate(20, 3.0)];
        assert_eq!(most_prominent(&faces).unwrap().embedding.as_slice(), &[2.0]);
    }

    #[test]
    fn first_face_wins_ties() {
        let faces = vec![candidate(10, 1.0), candidate(10, 2.0)];
        assert_eq!(most_prominent(&faces).unwrap().embedding.as_slice(), &[1.0]);
        assert!(most_prominent(&[]).is_none());
    }
}
