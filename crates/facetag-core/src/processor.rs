//! Per-photo processing: detect faces, identify each one, record the result.
//!
//! A photo only enters processing from [`PhotoState::Pending`]. Success moves
//! it to `Processed` together with its person associations; a detection or
//! identification error moves it to `Failed`. Failures are contained per photo,
//! so a batch always runs to the end.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::identifier::Identifier;
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::types::{
    DetectedFace, IdentifiedPerson, ImageSource, PersonId, Photo, PhotoId, PhotoState, Population,
    ProcessingOutcome,
};

/// Face detection and encoding backend.
///
/// Returns zero or more faces; an `Err` is a detection failure for this image only.
pub trait FaceDetector {
    fn detect(&self, image: &ImageSource) -> Result<Vec<DetectedFace>>;
}

/// Persistence of photo state and photo-person associations.
pub trait PhotoLedger {
    /// Photos still waiting for processing, in ascending id order.
    fn pending_photos(&self) -> Result<Vec<Photo>>;

    fn photo(&self, id: PhotoId) -> Result<Photo>;

    /// Move a pending photo to `Processed` and upsert one association per
    /// person, as a single unit. Nothing is written if the photo is not pending.
    fn complete(&mut self, id: PhotoId, associations: &BTreeMap<PersonId, f32>) -> Result<()>;

    /// Move a pending photo to `Failed`.
    fn fail(&mut self, id: PhotoId) -> Result<()>;
}

/// Summary of one pass over the pending photos.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    pub outcomes: BTreeMap<PhotoId, ProcessingOutcome>,
}

pub struct PhotoProcessor<D, M = EuclideanMatcher> {
    detector: D,
    identifier: Identifier<M>,
    dim: usize,
}

impl<D: FaceDetector, M: Matcher> PhotoProcessor<D, M> {
    /// `dim` is the embedding length the detector is expected to produce.
    pub fn new(detector: D, identifier: Identifier<M>, dim: usize) -> Self {
        Self {
            detector,
            identifier,
            dim,
        }
    }

    /// Identify every detected face against `population`.
    ///
    /// A face whose embedding has the wrong length fails the whole photo.
    pub fn analyze(&self, faces: &[DetectedFace], population: &Population) -> Result<ProcessingOutcome> {
        let mut outcome = ProcessingOutcome {
            total_faces: faces.len(),
            ..Default::default()
        };

        for (index, face) in faces.iter().enumerate() {
            face.embedding.check_dim(self.dim)?;
            let result = self.identifier.identify(&face.embedding, population);
            match result.person_id {
                Some(person_id) => {
                    tracing::debug!(face = index, person = %person_id, confidence = result.confidence, "face identified");
                    outcome.identified.push(IdentifiedPerson {
                        person_id,
                        confidence: result.confidence,
                    });
                }
                None => {
                    tracing::debug!(face = index, "face unidentified");
                    outcome.unidentified_count += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Process a single photo by id and apply its state transition.
    pub fn process<L: PhotoLedger>(
        &self,
        ledger: &mut L,
        id: PhotoId,
        population: &Population,
    ) -> Result<ProcessingOutcome> {
        let photo = ledger.photo(id)?;
        self.run(ledger, &photo, population)
    }

    /// Process every pending photo. One photo failing never stops the others.
    pub fn process_pending<L: PhotoLedger>(
        &self,
        ledger: &mut L,
        population: &Population,
    ) -> Result<BatchReport> {
        let pending = ledger.pending_photos()?;
        tracing::info!(
            photos = pending.len(),
            people = population.len(),
            "processing pass started"
        );

        let mut report = BatchReport::default();
        for photo in &pending {
            match self.run(ledger, photo, population) {
                Ok(outcome) => {
                    report.processed += 1;
                    report.outcomes.insert(photo.id, outcome);
                }
                Err(_) => report.failed += 1,
            }
        }

        tracing::info!(
            processed = report.processed,
            failed = report.failed,
            "processing pass finished"
        );
        Ok(report)
    }

    fn run<L: PhotoLedger>(
        &self,
        ledger: &mut L,
        photo: &Photo,
        population: &Population,
    ) -> Result<ProcessingOutcome> {
        if photo.state != PhotoState::Pending {
            return Err(Error::InvalidTransition {
                photo: photo.id,
                state: photo.state,
                expected: PhotoState::Pending,
            });
        }

        let image = ImageSource::Path(photo.file_path.clone());
        let analyzed = self
            .detector
            .detect(&image)
            .and_then(|faces| self.analyze(&faces, population));

        match analyzed {
            Ok(outcome) => {
                // A ledger error here leaves the photo pending for the next pass.
                ledger.complete(photo.id, &outcome.associations())?;
                tracing::info!(
                    photo = %photo.id,
                    total_faces = outcome.total_faces,
                    identified = outcome.identified.len(),
                    unidentified = outcome.unidentified_count,
                    "photo processed"
                );
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(photo = %photo.id, path = %photo.file_path.display(), error = %err, "photo failed");
                if let Err(mark_err) = ledger.fail(photo.id) {
                    tracing::error!(photo = %photo.id, error = %mark_err, "could not mark photo failed");
                }
                Err(err)
            }
        }
    }
}
