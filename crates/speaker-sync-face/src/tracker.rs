use speaker_sync_types::FaceBox;

use crate::locator::DetectedFace;
use crate::matcher::FrameDecision;

/// Remembers the speaker's last known box across frames.
///
/// A frame without any detection repeats the previous output, while a frame
/// whose faces all belong to someone else clears it.
#[derive(Debug, Clone, Default)]
pub struct TargetTracker {
    last: Option<FaceBox>,
}

impl TargetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<FaceBox> {
        self.last
    }

    pub fn observe(&mut self, decision: FrameDecision) -> Option<FaceBox> {
        match decision {
            FrameDecision::Matched(face) => self.last = Some(face),
            FrameDecision::Rejected => self.last = None,
            FrameDecision::NoDetection => {}
        }
        self.last
    }

    /// Identity-less variant: the highest-scoring detection becomes the target.
    pub fn observe_detections(&mut self, detections: &[DetectedFace]) -> Option<FaceBox> {
        let decision = match detections.first() {
            Some(face) => FrameDecision::Matched(face.face_box),
            None => FrameDecision::NoDetection,
        };
        self.observe(decision)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::embedding::Embedding;
    use crate::enroll::{EnrollmentStore, ReferenceFace};
    use crate::locator::FrameCandidate;
    use crate::matcher::SpeakerMatcher;

    fn boxed(left: i32) -> FaceBox {
        FaceBox::new(10, left + 20, 30, left)
    }

    #[test]
    fn absent_until_first_match() {
        let mut tracker = TargetTracker::new();
        assert_eq!(tracker.observe(FrameDecision::NoDetection), None);
        assert_eq!(tracker.observe(FrameDecision::Rejected), None);
        assert_eq!(
            tracker.observe(FrameDecision::Matched(boxed(5))),
            Some(boxed(5))
        );
    }

    #[test]
    fn no_detection_carries_forward_and_rejection_resets() {
        let mut tracker = TargetTracker::new();
        tracker.observe(FrameDecision::Matched(boxed(5)));
        assert_eq!(tracker.observe(FrameDecision::NoDetection), Some(boxed(5)));
        assert_eq!(tracker.observe(FrameDecision::NoDetection), Some(boxed(5)));
        assert_eq!(tracker.observe(FrameDecision::Rejected), None);
        assert_eq!(tracker.observe(FrameDecision::NoDetection), None);
    }

    #[test]
    fn detections_take_the_first_box() {
        let mut tracker = TargetTracker::new();
        let faces = [
            DetectedFace {
                face_box: boxed(1),
                score: 0.9,
            },
            DetectedFace {
                face_box: boxed(2),
                score: 0.8,
            },
        ];
        assert_eq!(tracker.observe_detections(&faces), Some(boxed(1)));
        assert_eq!(tracker.observe_detections(&[]), Some(boxed(1)));
    }

    #[test]
    fn alice_and_bob_sequence() {
        let reference = |name: &str, values: Vec<f32>| ReferenceFace {
            name: name.to_string(),
            embedding: Embedding::new(values).unwrap(),
            source: PathBuf::from(format!("{name}.png")),
        };
        let store = Arc::new(
            EnrollmentStore::from_faces(vec![
                reference("alice", vec![0.0, 0.0, 0.0]),
                reference("bob", vec![1.0, 1.0, 1.0]),
            ])
            .unwrap(),
        );
        let matcher = SpeakerMatcher::new(store, "alice", 0.4);
        let alice_box = boxed(40);
        let alice = FrameCandidate::new(alice_box, Embedding::new(vec![0.05, 0.0, 0.0]).unwrap());
        let bob = FrameCandidate::new(boxed(100), Embedding::new(vec![1.0, 1.0, 0.95]).unwrap());

        let frames: Vec<Vec<FrameCandidate>> = vec![
            vec![bob.clone()],
            vec![bob.clone()],
            vec![alice.clone(), bob.clone()],
            vec![alice.clone()],
            vec![bob.clone(), alice.clone()],
            vec![],
            vec![],
        ];

        let mut tracker = TargetTracker::new();
        let tracked: Vec<Option<FaceBox>> = frames
            .iter()
            .map(|faces| tracker.observe(matcher.decide(faces).unwrap()))
            .collect();

        assert_eq!(
            tracked,
            vec![
                None,
                None,
                Some(alice_box),
                Some(alice_box),
                Some(alice_box),
                Some(alice_box),
                Some(alice_box),
            ]
        );
    }
}
