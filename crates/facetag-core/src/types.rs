use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::Error;

/// Identifier of an enrolled person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(pub i64);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an uploaded photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoId(pub i64);

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Face embedding vector (128-dimensional for the reference encoder).
///
/// Serialized as a plain array of floats. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Reject an embedding whose length is not `expected`.
    pub fn check_dim(&self, expected: usize) -> Result<(), Error> {
        if self.values.len() != expected {
            return Err(Error::Validation {
                expected,
                actual: self.values.len(),
            });
        }
        Ok(())
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Embeddings of different lengths live in different spaces; their
    /// distance is `f32::INFINITY`.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Bounding box of a detected face in image pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One face found in an image: its embedding plus where it was.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    pub embedding: Embedding,
    #[serde(default)]
    pub bbox: BoundingBox,
}

/// Where a detector reads an image from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Result of comparing one unknown embedding against one person's embeddings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub is_match: bool,
    /// `1 - best_distance`. Uncalibrated and negative when the distance exceeds 1.
    pub confidence: f32,
}

impl MatchResult {
    pub const NO_MATCH: MatchResult = MatchResult {
        is_match: false,
        confidence: 0.0,
    };
}

/// Best person across a population, or none.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IdentificationResult {
    pub person_id: Option<PersonId>,
    pub confidence: f32,
}

impl IdentificationResult {
    pub const UNIDENTIFIED: IdentificationResult = IdentificationResult {
        person_id: None,
        confidence: 0.0,
    };
}

/// Read-only view of every enrolled person's embeddings, keyed in ascending id order.
pub type Population = BTreeMap<PersonId, Vec<Embedding>>;

/// Processing state of a photo.
///
/// `Pending -> Processed` on success, `Pending -> Failed` on error. Both
/// outcomes are terminal for the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoState {
    Pending,
    Processed,
    Failed,
}

impl PhotoState {
    /// Integer code used in storage: 0 pending, 1 processed, -1 failed.
    pub fn code(self) -> i64 {
        match self {
            PhotoState::Pending => 0,
            PhotoState::Processed => 1,
            PhotoState::Failed => -1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(PhotoState::Pending),
            1 => Some(PhotoState::Processed),
            -1 => Some(PhotoState::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PhotoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhotoState::Pending => "pending",
            PhotoState::Processed => "processed",
            PhotoState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// An uploaded photo as seen by the processor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Photo {
    pub id: PhotoId,
    pub file_path: PathBuf,
    pub state: PhotoState,
}

/// One identified face within a photo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IdentifiedPerson {
    pub person_id: PersonId,
    pub confidence: f32,
}

/// Per-photo summary of a processing pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingOutcome {
    pub total_faces: usize,
    /// One entry per identified face, in detection order.
    pub identified: Vec<IdentifiedPerson>,
    pub unidentified_count: usize,
}

impl ProcessingOutcome {
    /// Collapse identified faces to one confidence per person. A person seen
    /// more than once keeps the last-computed confidence.
    pub fn associations(&self) -> BTreeMap<PersonId, f32> {
        let mut map = BTreeMap::new();
        for hit in &self.identified {
            map.insert(hit.person_id, hit.confidence);
        }
        map
    }
}
