use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::embedding::Embedding;
use crate::error::FaceError;
use crate::locator::{FaceLocator, most_prominent};

/// Separates the identity from a disambiguating suffix in reference file
/// names, e.g. `john--2.png`.
pub const NAME_SEPARATOR: &str = "--";

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceFace {
    pub name: String,
    pub embedding: Embedding,
    pub source: PathBuf,
}

/// Identity of a reference image derived from its file name.
pub fn parse_face_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.split_once(NAME_SEPARATOR) {
        Some((name, _)) => name.to_string(),
        None => stem,
    }
}

/// Reference embeddings collected before any frame is processed; read-only
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentStore {
    faces: Vec<ReferenceFace>,
}

impl EnrollmentStore {
    /// Runs `locator` on every reference image and keeps the most prominent
    /// face of each. Images that cannot be read or contain no face are
    /// skipped.
    pub fn build<P: AsRef<Path>>(
        paths: &[P],
        locator: &dyn FaceLocator,
    ) -> Result<Self, FaceError> {
        let mut faces: Vec<ReferenceFace> = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let image = match image::open(path) {
                Ok(image) => image.to_rgb8(),
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "skipping unreadable reference image"
                    );
                    continue;
                }
            };
            let candidates = locator.locate(&image)?;
            let Some(candidate) = most_prominent(&candidates) else {
                warn!(path = %path.display(), "no face found in reference image; skipping");
                continue;
            };
            if let Some(first) = faces.first() {
                if first.embedding.dimension() != candidate.embedding.dimension() {
                    return Err(FaceError::DimensionMismatch {
                        expected: first.embedding.dimension(),
                        got: candidate.embedding.dimension(),
                    });
                }
            }
            let name = parse_face_name(path);
            debug!(
                name = %name,
                path = %path.display(),
                faces = candidates.len(),
                "enrolled reference face"
            );
            faces.push(ReferenceFace {
                name,
                embedding: candidate.embedding.clone(),
                source: path.to_path_buf(),
            });
        }
        Ok(Self { faces })
    }

    pub fn from_faces(faces: Vec<ReferenceFace>) -> Result<Self, FaceError> {
        if let Some(first) = faces.first() {
            let expected = first.embedding.dimension();
            if let Some(other) = faces.iter().find(|f| f.embedding.dimension() != expected) {
                return Err(FaceError::DimensionMismatch {
                    expected,
                    got: other.embedding.dimension(),
                });
            }
        }
        Ok(Self { faces })
    }

    pub fn faces(&self) -> &[ReferenceFace] {
        &self.faces
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Distinct enrolled identities in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.faces
            .iter()
            .map(|face| face.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.faces.iter().any(|face| face.name == name)
    }

    pub fn dimension(&self) -> Option<usize> {
        self.faces.first().map(|face| face.embedding.dimension())
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use speaker_sync_types::FaceBox;

    use super::*;
    use crate::locator::FrameCandidate;

    /// Reports one face per non-black pixel in the first row, sized by column,
    /// with the red channel as the embedding.
    struct PixelLocator;

    impl FaceLocator for PixelLocator {
        fn name(&self) -> &'static str {
            "pixel"
        }

        fn locate(&self, image: &RgbImage) -> Result<Vec<FrameCandidate>, FaceError> {
            let mut out = Vec::new();
            for x in 0..image.width() {
                let [r, _, _] = image.get_pixel(x, 0).0;
                if r > 0 {
                    let size = x as i32 + 1;
                    out.push(FrameCandidate::new(
                        FaceBox::new(0, size, size, 0),
                        Embedding::new(vec![f32::from(r)])?,
                    ));
                }
            }
            Ok(out)
        }
    }

    fn write_image(dir: &Path, name: &str, pixels: &[(u32, u8)]) -> PathBuf {
        let mut image = RgbImage::new(4, 1);
        for (x, r) in pixels {
            image.put_pixel(*x, 0, Rgb([*r, 0, 0]));
        }
        let path = dir.join(name);
        image.save(&path).unwrap();
        path
    }

    #[test]
    fn names_strip_suffix_after_separator() {
        assert_eq!(parse_face_name(Path::new("refs/john--2.png")), "john");
        assert_eq!(parse_face_name(Path::new("refs/alice.jpg")), "alice");
        assert_eq!(parse_face_name(Path::new("a--b--c.png")), "a");
    }

    #[test]
    fn build_keeps_prominent_face_and_skips_empty_images() {
        let dir = tempfile::tempdir().unwrap();
        let alice = write_image(dir.path(), "alice.png", &[(0, 10), (2, 20)]);
        let nobody = write_image(dir.path(), "nobody.png", &[]);
        let bob = write_image(dir.path(), "bob--1.png", &[(1, 30)]);
        let missing = dir.path().join("missing.png");

        let store = EnrollmentStore::build(&[alice, nobody, missing, bob], &PixelLocator).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.faces()[0].name, "alice");
        assert_eq!(store.faces()[0].embedding.as_slice(), &[20.0]);
        assert_eq!(store.faces()[1].name, "bob");
        assert_eq!(store.names(), vec!["alice".to_string(), "bob".to_string()]);
        assert!(store.contains("bob"));
        assert!(!store.contains("nobody"));
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let faces = vec![
            ReferenceFace {
                name: "a".into(),
                embedding: Embedding::new(vec![0.0]).unwrap(),
                source: PathBuf::from("a.png"),
            },
            ReferenceFace {
                name: "b".into(),
                embedding: Embedding::new(vec![0.0, 1.0]).unwrap(),
                source: PathBuf::from("b.png"),
            },
        ];
        assert!(EnrollmentStore::from_faces(faces).is_err());
    }
}
