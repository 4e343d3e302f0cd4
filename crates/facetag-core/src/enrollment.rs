//! Recording reference embeddings for a person.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::processor::FaceDetector;
use crate::store::EmbeddingRepository;
use crate::types::{Embedding, ImageSource, PersonId};

/// Accepted samples needed for an enrollment to count as successful.
pub const MIN_ENROLL_SAMPLES: usize = 3;

/// One enrollment sample.
#[derive(Debug, Clone)]
pub enum Sample {
    /// An image to run through the detector. Only its first face is used.
    Image(ImageSource),
    /// An embedding extracted elsewhere.
    Embedding(Embedding),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Enrollment {
    pub enrolled_count: usize,
    /// Samples skipped because no usable face came out of them.
    pub dropped: usize,
}

pub struct EnrollmentCoordinator<D> {
    detector: D,
    min_samples: usize,
    dim: usize,
}

impl<D: FaceDetector> EnrollmentCoordinator<D> {
    pub fn new(detector: D, dim: usize) -> Self {
        Self {
            detector,
            min_samples: MIN_ENROLL_SAMPLES,
            dim,
        }
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    /// Add one embedding per usable sample to `person`.
    ///
    /// Samples without a detectable face, or whose detection fails, are
    /// dropped. Every accepted embedding is written as soon as it is found, so
    /// an [`Error::InsufficientSamples`] result still leaves those embeddings
    /// stored. A pre-extracted embedding of the wrong length aborts with
    /// [`Error::Validation`].
    pub fn enroll<R, I>(&self, repo: &mut R, person: PersonId, samples: I) -> Result<Enrollment>
    where
        R: EmbeddingRepository,
        I: IntoIterator<Item = Sample>,
    {
        if !repo.contains_person(person)? {
            return Err(Error::PersonNotFound(person));
        }

        let mut report = Enrollment {
            enrolled_count: 0,
            dropped: 0,
        };

        for (index, sample) in samples.into_iter().enumerate() {
            let embedding = match sample {
                Sample::Embedding(embedding) => embedding,
                Sample::Image(image) => match self.first_face(&image) {
                    Some(embedding) => embedding,
                    None => {
                        tracing::debug!(person = %person, sample = index, "sample dropped");
                        report.dropped += 1;
                        continue;
                    }
                },
            };
            repo.add(person, embedding)?;
            report.enrolled_count += 1;
        }

        tracing::info!(
            person = %person,
            enrolled = report.enrolled_count,
            dropped = report.dropped,
            "enrollment finished"
        );

        if report.enrolled_count < self.min_samples {
            return Err(Error::InsufficientSamples {
                accepted: report.enrolled_count,
                required: self.min_samples,
            });
        }
        Ok(report)
    }

    fn first_face(&self, image: &ImageSource) -> Option<Embedding> {
        let faces = match self.detector.detect(image) {
            Ok(faces) => faces,
            Err(err) => {
                tracing::warn!(error = %err, "enrollment sample detection failed");
                return None;
            }
        };
        if faces.len() > 1 {
            tracing::debug!(faces = faces.len(), "enrollment sample has several faces, using the first");
        }
        let face = faces.into_iter().next()?;
        if let Err(err) = face.embedding.check_dim(self.dim) {
            tracing::warn!(error = %err, "detector returned a malformed embedding");
            return None;
        }
        Some(face.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EmbeddingStore;
    use crate::types::{BoundingBox, DetectedFace};

    const DIM: usize = 3;

    /// Reads the face count from the first byte of the image and fails on 0xFF.
    struct ByteDetector;

    impl FaceDetector for ByteDetector {
        fn detect(&self, image: &ImageSource) -> Result<Vec<DetectedFace>> {
            let ImageSource::Bytes(bytes) = image else {
                return Err(Error::Detection("expected bytes".into()));
            };
            let count = bytes.first().copied().unwrap_or(0);
            if count == 0xFF {
                return Err(Error::Detection("corrupt image".into()));
            }
            Ok((0..count)
                .map(|i| DetectedFace {
                    embedding: Embedding::new(vec![i as f32; DIM]),
                    bbox: BoundingBox::default(),
                })
                .collect())
        }
    }

    fn image(faces: u8) -> Sample {
        Sample::Image(ImageSource::Bytes(vec![faces]))
    }

    fn setup() -> (EnrollmentCoordinator<ByteDetector>, EmbeddingStore) {
        let mut store = EmbeddingStore::new(DIM);
        store.register(PersonId(1));
        (EnrollmentCoordinator::new(ByteDetector, DIM), store)
    }

    #[test]
    fn test_three_samples_succeed() {
        let (coord, mut store) = setup();
        let report = coord
            .enroll(&mut store, PersonId(1), vec![image(1), image(1), image(1)])
            .unwrap();
        assert_eq!(report.enrolled_count, 3);
        assert_eq!(store.snapshot(PersonId(1)).unwrap().len(), 3);
    }

    #[test]
    fn test_two_usable_samples_fail_but_are_kept() {
        let (coord, mut store) = setup();
        let samples = vec![image(1), image(0), image(0xFF), image(1), image(0)];
        let err = coord.enroll(&mut store, PersonId(1), samples).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientSamples { accepted: 2, required: 3 }
        ));
        assert_eq!(store.snapshot(PersonId(1)).unwrap().len(), 2);
    }

    #[test]
    fn test_multi_face_sample_uses_first_face() {
        let (coord, mut store) = setup();
        coord
            .enroll(&mut store, PersonId(1), vec![image(3), image(2), image(1)])
            .unwrap();
        let list = store.snapshot(PersonId(1)).unwrap();
        assert_eq!(list.len(), 3);
        assert!(list.iter().all(|e| e.values() == [0.0; DIM]));
    }

    #[test]
    fn test_pre_extracted_embeddings() {
        let (coord, mut store) = setup();
        let samples = (0..4).map(|i| Sample::Embedding(Embedding::new(vec![i as f32; DIM])));
        let report = coord.enroll(&mut store, PersonId(1), samples).unwrap();
        assert_eq!(report, Enrollment { enrolled_count: 4, dropped: 0 });
    }

    #[test]
    fn test_malformed_embedding_is_surfaced() {
        let (coord, mut store) = setup();
        let samples = vec![
            Sample::Embedding(Embedding::new(vec![0.0; DIM])),
            Sample::Embedding(Embedding::new(vec![0.0; DIM + 2])),
        ];
        let err = coord.enroll(&mut store, PersonId(1), samples).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(store.snapshot(PersonId(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_person() {
        let (coord, mut store) = setup();
        let err = coord
            .enroll(&mut store, PersonId(2), vec![image(1)])
            .unwrap_err();
        assert!(matches!(err, Error::PersonNotFound(PersonId(2))));
    }

    #[test]
    fn test_custom_minimum() {
        let (coord, mut store) = setup();
        let coord = coord.with_min_samples(1);
        let report = coord.enroll(&mut store, PersonId(1), vec![image(1)]).unwrap();
        assert_eq!(report.enrolled_count, 1);
    }
}
