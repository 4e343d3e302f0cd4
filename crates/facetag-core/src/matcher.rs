//! Nearest-neighbour matching of one unknown embedding against one person.

use crate::types::{Embedding, MatchResult};

/// Default maximum distance for a match. Lower is stricter.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Strategy for comparing a probe embedding against one person's embeddings.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, known: &[Embedding]) -> MatchResult;
}

/// Euclidean nearest-neighbour matcher with a fixed tolerance.
///
/// Scans every known embedding; the closest one decides. Equal distances
/// keep the earliest index. Known embeddings whose length differs from the
/// probe are skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EuclideanMatcher {
    tolerance: f32,
}

impl EuclideanMatcher {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Euclidean distance between two embeddings.
    pub fn distance(a: &Embedding, b: &Embedding) -> f32 {
        a.euclidean_distance(b)
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, known: &[Embedding]) -> MatchResult {
        let mut best: Option<f32> = None;

        for candidate in known {
            if candidate.dim() != probe.dim() {
                tracing::warn!(
                    probe_dim = probe.dim(),
                    known_dim = candidate.dim(),
                    "embedding length mismatch, skipped"
                );
                continue;
            }
            let d = Self::distance(probe, candidate);
            match best {
                Some(b) if d >= b => {}
                _ => best = Some(d),
            }
        }

        match best {
            None => MatchResult::NO_MATCH,
            Some(min_distance) => MatchResult {
                is_match: min_distance <= self.tolerance,
                confidence: 1.0 - min_distance,
            },
        }
    }
}
