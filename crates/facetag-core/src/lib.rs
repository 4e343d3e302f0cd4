//! facetag-core: Matching photos to enrolled people by face embedding.
//!
//! Reference embeddings accumulate per person in an [`EmbeddingRepository`].
//! The [`Identifier`] resolves each detected face against that population and
//! the [`PhotoProcessor`] turns a photo's faces into person associations,
//! driving the pending/processed/failed state of each photo.

pub mod enrollment;
pub mod error;
pub mod identifier;
pub mod ledger;
pub mod matcher;
pub mod processor;
pub mod store;
pub mod types;

pub use enrollment::{Enrollment, EnrollmentCoordinator, Sample, MIN_ENROLL_SAMPLES};
pub use error::{Error, Result};
pub use identifier::Identifier;
pub use ledger::MemoryLedger;
pub use matcher::{EuclideanMatcher, Matcher, DEFAULT_TOLERANCE};
pub use processor::{BatchReport, FaceDetector, PhotoLedger, PhotoProcessor};
pub use store::{EmbeddingRepository, EmbeddingStore};
pub use types::{
    BoundingBox, DetectedFace, Embedding, IdentificationResult, IdentifiedPerson, ImageSource,
    MatchResult, PersonId, Photo, PhotoId, PhotoState, Population, ProcessingOutcome,
};

/// Embedding length produced by the reference encoder.
pub const DEFAULT_EMBEDDING_DIM: usize = 128;
