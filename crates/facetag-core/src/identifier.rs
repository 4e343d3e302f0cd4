//! Resolve an unknown embedding to the best-matching person in a population.
//!
//! This is an exhaustive scan: O(people x embeddings per person) distance
//! computations per face. Fine for tens to low hundreds of people, and the
//! main scaling limit beyond that. Approximate search would change which
//! person wins, so it is deliberately not used here.

use crate::matcher::{EuclideanMatcher, Matcher};
use crate::types::{Embedding, IdentificationResult, Population};

pub struct Identifier<M = EuclideanMatcher> {
    matcher: M,
}

impl<M: Matcher> Identifier<M> {
    pub fn new(matcher: M) -> Self {
        Self { matcher }
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    /// Best matching person for `probe`, or [`IdentificationResult::UNIDENTIFIED`].
    ///
    /// People are visited in ascending id order and only a strictly greater
    /// confidence replaces the current best, so ties go to the lowest id.
    pub fn identify(&self, probe: &Embedding, population: &Population) -> IdentificationResult {
        let mut best = IdentificationResult::UNIDENTIFIED;

        for (person_id, known) in population {
            if known.is_empty() {
                continue;
            }
            let result = self.matcher.compare(probe, known);
            if !result.is_match {
                continue;
            }
            if best.person_id.is_none() || result.confidence > best.confidence {
                best = IdentificationResult {
                    person_id: Some(*person_id),
                    confidence: result.confidence,
                };
            }
        }

        best
    }
}

impl Default for Identifier<EuclideanMatcher> {
    fn default() -> Self {
        Self::new(EuclideanMatcher::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PersonId;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn identifier() -> Identifier {
        Identifier::default()
    }

    #[test]
    fn test_empty_population() {
        let result = identifier().identify(&emb(&[0.0, 0.0]), &Population::new());
        assert_eq!(result, IdentificationResult::UNIDENTIFIED);
    }

    #[test]
    fn test_single_person_at_half_distance() {
        let e1 = vec![0.0f32; 128];
        let mut unknown = vec![0.0f32; 128];
        unknown[0] = 0.5;

        let mut pop = Population::new();
        pop.insert(PersonId(1), vec![Embedding::new(e1)]);

        let result = identifier().identify(&Embedding::new(unknown), &pop);
        assert_eq!(result.person_id, Some(PersonId(1)));
        assert!((result.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_picks_highest_confidence() {
        let mut pop = Population::new();
        pop.insert(PersonId(1), vec![emb(&[0.5, 0.0])]);
        pop.insert(PersonId(2), vec![emb(&[0.9, 0.0]), emb(&[0.1, 0.0])]);
        pop.insert(PersonId(3), vec![emb(&[0.3, 0.0])]);

        let result = identifier().identify(&emb(&[0.0, 0.0]), &pop);
        assert_eq!(result.person_id, Some(PersonId(2)));
        assert!((result.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_non_matching_people_ignored() {
        let mut pop = Population::new();
        pop.insert(PersonId(1), vec![emb(&[0.0, 0.9])]);
        pop.insert(PersonId(2), vec![emb(&[0.0, 0.55])]);

        let result = identifier().identify(&emb(&[0.0, 0.0]), &pop);
        assert_eq!(result.person_id, Some(PersonId(2)));

        let strict = Identifier::new(EuclideanMatcher::new(0.5));
        assert_eq!(strict.identify(&emb(&[0.0, 0.0]), &pop), IdentificationResult::UNIDENTIFIED);
    }

    #[test]
    fn test_person_without_embeddings_never_matches() {
        let mut pop = Population::new();
        pop.insert(PersonId(1), Vec::new());
        let result = identifier().identify(&emb(&[0.0]), &pop);
        assert_eq!(result, IdentificationResult::UNIDENTIFIED);
    }

    #[test]
    fn test_tie_goes_to_lowest_id() {
        let mut pop = Population::new();
        pop.insert(PersonId(7), vec![emb(&[0.0, 0.2])]);
        pop.insert(PersonId(4), vec![emb(&[0.2, 0.0])]);

        let result = identifier().identify(&emb(&[0.0, 0.0]), &pop);
        assert_eq!(result.person_id, Some(PersonId(4)));
    }

    #[test]
    fn test_negative_confidence_match_is_kept() {
        // Tolerance above 1 allows a match with negative confidence.
        let mut pop = Population::new();
        pop.insert(PersonId(1), vec![emb(&[1.5, 0.0])]);
        let loose = Identifier::new(EuclideanMatcher::new(2.0));
        let result = loose.identify(&emb(&[0.0, 0.0]), &pop);
        assert_eq!(result.person_id, Some(PersonId(1)));
        assert!((result.confidence + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_wrong_length_population_is_unidentified() {
        let mut pop = Population::new();
        pop.insert(PersonId(1), vec![emb(&[0.0, 0.0])]);
        let result = identifier().identify(&emb(&[0.0]), &pop);
        assert_eq!(result, IdentificationResult::UNIDENTIFIED);
    }
}
