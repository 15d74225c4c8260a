use std::fmt;
use std::sync::Arc;

use speaker_sync_types::FaceBox;
use tracing::debug;

use crate::embedding::similarity;
use crate::enroll::EnrollmentStore;
use crate::error::FaceError;
use crate::locator::FrameCandidate;

/// Maximum embedding distance accepted as the same person.
pub const DEFAULT_TOLERANCE: f32 = 0.4;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub candidate: FrameCandidate,
    pub name: Option<String>,
    pub distance: f32,
    pub similarity: f32,
}

impl MatchResult {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }

    pub fn is_match(&self) -> bool {
        self.name.is_some()
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.0}%)",
            self.display_name(),
            self.similarity * 100.0
        )
    }
}

/// Outcome of matching every face in one frame against the speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecision {
    Matched(FaceBox),
    Rejected,
    NoDetection,
}

#[derive(Debug, Clone)]
pub struct SpeakerMatcher {
    store: Arc<EnrollmentStore>,
    speaker: String,
    tolerance: f32,
}

impl SpeakerMatcher {
    pub fn new(store: Arc<EnrollmentStore>, speaker: impl Into<String>, tolerance: f32) -> Self {
        Self {
            store,
            speaker: speaker.into(),
            tolerance: tolerance.max(0.0),
        }
    }

    pub fn speaker(&self) -> &str {
        &self.speaker
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Compares one candidate against every reference face and names it after
    /// the closest one when that reference is within tolerance.
    pub fn match_candidate(&self, candidate: &FrameCandidate) -> Result<MatchResult, FaceError> {
        let mut best: Option<(usize, f32)> = None;
        for (index, reference) in self.store.faces().iter().enumerate() {
            let distance = candidate.embedding.distance(&reference.embedding)?;
            if best.is_none_or(|(_, current)| distance < current) {
                best = Some((index, distance));
            }
        }

        let (name, distance) = match best {
            Some((index, distance)) if distance <= self.tolerance => {
                (Some(self.store.faces()[index].name.clone()), distance)
            }
            Some((_, distance)) => (None, distance),
            None => (None, f32::INFINITY),
        };
        let similarity = if name.is_some() {
            similarity(distance)
        } else {
            0.0
        };
        Ok(MatchResult {
            candidate: candidate.clone(),
            name,
            distance,
            similarity,
        })
    }

    /// Picks the speaker's box among all faces of a frame. When several faces
    /// match the speaker, the last one in detector order wins.
    pub fn decide(&self, candidates: &[FrameCandidate]) -> Result<FrameDecision, FaceError> {
        if candidates.is_empty() {
            return Ok(FrameDecision::NoDetection);
        }
        let mut decision = FrameDecision::Rejected;
        for candidate in candidates {
            let result = self.match_candidate(candidate)?;
            debug!(
                name = result.display_name(),
                distance = result.distance,
                similarity_pct = result.similarity * 100.0,
                "face match"
            );
            if result.name.as_deref() == Some(self.speaker.as_str()) {
                decision = FrameDecision::Matched(candidate.face_box);
            }
        }
        Ok(decision)
    }
}
