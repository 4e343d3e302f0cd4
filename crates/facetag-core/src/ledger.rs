//! In-memory [`PhotoLedger`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::processor::PhotoLedger;
use crate::types::{PersonId, Photo, PhotoId, PhotoState};

/// Photo states plus a `(photo, person) -> confidence` association map.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    photos: BTreeMap<PhotoId, Photo>,
    associations: BTreeMap<(PhotoId, PersonId), f32>,
    next_id: i64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending photo.
    pub fn add_photo(&mut self, file_path: impl Into<PathBuf>) -> PhotoId {
        self.next_id += 1;
        let id = PhotoId(self.next_id);
        self.photos.insert(
            id,
            Photo {
                id,
                file_path: file_path.into(),
                state: PhotoState::Pending,
            },
        );
        id
    }

    /// People associated with a photo and their confidence.
    pub fn associations(&self, photo: PhotoId) -> BTreeMap<PersonId, f32> {
        self.associations
            .range((photo, PersonId(i64::MIN))..=(photo, PersonId(i64::MAX)))
            .map(|((_, person), confidence)| (*person, *confidence))
            .collect()
    }

    /// Put a failed photo back in the queue.
    pub fn reset(&mut self, id: PhotoId) -> Result<()> {
        let photo = self.photos.get_mut(&id).ok_or(Error::PhotoNotFound(id))?;
        if photo.state != PhotoState::Failed {
            return Err(Error::InvalidTransition {
                photo: id,
                state: photo.state,
                expected: PhotoState::Failed,
            });
        }
        photo.state = PhotoState::Pending;
        Ok(())
    }

    fn pending_mut(&mut self, id: PhotoId) -> Result<&mut Photo> {
        let photo = self.photos.get_mut(&id).ok_or(Error::PhotoNotFound(id))?;
        if photo.state != PhotoState::Pending {
            return Err(Error::InvalidTransition {
                photo: id,
                state: photo.state,
                expected: PhotoState::Pending,
            });
        }
        Ok(photo)
    }
}

impl PhotoLedger for MemoryLedger {
    fn pending_photos(&self) -> Result<Vec<Photo>> {
        Ok(self
            .photos
            .values()
            .filter(|p| p.state == PhotoState::Pending)
            .cloned()
            .collect())
    }

    fn photo(&self, id: PhotoId) -> Result<Photo> {
        self.photos.get(&id).cloned().ok_or(Error::PhotoNotFound(id))
    }

    fn complete(&mut self, id: PhotoId, associations: &BTreeMap<PersonId, f32>) -> Result<()> {
        self.pending_mut(id)?.state = PhotoState::Processed;
        for (person, confidence) in associations {
            self.associations.insert((id, *person), *confidence);
        }
        Ok(())
    }

    fn fail(&mut self, id: PhotoId) -> Result<()> {
        self.pending_mut(id)?.state = PhotoState::Failed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_writes_state_and_associations() {
        let mut ledger = MemoryLedger::new();
        let id = ledger.add_photo("p.jpg");
        let other = ledger.add_photo("q.jpg");

        let mut assoc = BTreeMap::new();
        assoc.insert(PersonId(2), 0.7);
        assoc.insert(PersonId(5), 0.9);
        ledger.complete(id, &assoc).unwrap();

        assert_eq!(ledger.photo(id).unwrap().state, PhotoState::Processed);
        assert_eq!(ledger.associations(id), assoc);
        assert!(ledger.associations(other).is_empty());
        assert_eq!(ledger.pending_photos().unwrap().len(), 1);
    }

    #[test]
    fn test_complete_refuses_non_pending() {
        let mut ledger = MemoryLedger::new();
        let id = ledger.add_photo("p.jpg");
        ledger.fail(id).unwrap();

        let mut assoc = BTreeMap::new();
        assoc.insert(PersonId(1), 0.5);
        assert!(ledger.complete(id, &assoc).is_err());
        assert!(ledger.associations(id).is_empty());
        assert_eq!(ledger.photo(id).unwrap().state, PhotoState::Failed);
    }

    #[test]
    fn test_reset_only_from_failed() {
        let mut ledger = MemoryLedger::new();
        let id = ledger.add_photo("p.jpg");
        assert!(matches!(
            ledger.reset(id),
            Err(Error::InvalidTransition { state: PhotoState::Pending, .. })
        ));
        ledger.fail(id).unwrap();
        ledger.reset(id).unwrap();
        assert_eq!(ledger.photo(id).unwrap().state, PhotoState::Pending);
        assert!(matches!(ledger.reset(PhotoId(99)), Err(Error::PhotoNotFound(_))));
    }
}
