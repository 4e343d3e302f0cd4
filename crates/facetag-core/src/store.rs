//! Per-person accumulation of enrollment embeddings.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::{Embedding, PersonId, Population};

/// Storage of reference embeddings, one ordered append-only list per person.
///
/// Implemented in memory by [`EmbeddingStore`] and on disk by the SQLite store.
pub trait EmbeddingRepository {
    /// Whether `person` has been registered, with or without embeddings.
    fn contains_person(&self, person: PersonId) -> Result<bool>;

    /// Append an embedding to a person's list.
    ///
    /// Fails with [`Error::Validation`] on a wrong-length embedding and
    /// [`Error::PersonNotFound`] for an unknown person.
    fn add(&mut self, person: PersonId, embedding: Embedding) -> Result<()>;

    /// Copy of a person's embeddings in enrollment order.
    fn embeddings(&self, person: PersonId) -> Result<Vec<Embedding>>;

    fn has_any(&self, person: PersonId) -> Result<bool> {
        Ok(!self.embeddings(person)?.is_empty())
    }

    /// Snapshot of every person with at least one embedding.
    fn population(&self) -> Result<Population>;
}

/// In-memory embedding store.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    dim: usize,
    people: BTreeMap<PersonId, Vec<Embedding>>,
}

impl EmbeddingStore {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            people: BTreeMap::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Register a person with no embeddings. Registering twice is a no-op.
    pub fn register(&mut self, person: PersonId) {
        self.people.entry(person).or_default();
    }

    pub fn contains(&self, person: PersonId) -> bool {
        self.people.contains_key(&person)
    }

    pub fn snapshot(&self, person: PersonId) -> Result<Vec<Embedding>> {
        self.people
            .get(&person)
            .cloned()
            .ok_or(Error::PersonNotFound(person))
    }
}

impl EmbeddingRepository for EmbeddingStore {
    fn contains_person(&self, person: PersonId) -> Result<bool> {
        Ok(self.contains(person))
    }

    fn add(&mut self, person: PersonId, embedding: Embedding) -> Result<()> {
        embedding.check_dim(self.dim)?;
        let list = self
            .people
            .get_mut(&person)
            .ok_or(Error::PersonNotFound(person))?;
        list.push(embedding);
        tracing::debug!(person = %person, count = list.len(), "embedding added");
        Ok(())
    }

    fn embeddings(&self, person: PersonId) -> Result<Vec<Embedding>> {
        self.snapshot(person)
    }

    fn population(&self) -> Result<Population> {
        Ok(self
            .people
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(id, list)| (*id, list.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(dim: usize, v: f32) -> Embedding {
        Embedding::new(vec![v; dim])
    }

    #[test]
    fn test_add_appends_in_order() {
        let mut store = EmbeddingStore::new(4);
        store.register(PersonId(1));
        store.add(PersonId(1), emb(4, 0.1)).unwrap();
        store.add(PersonId(1), emb(4, 0.2)).unwrap();
        let list = store.snapshot(PersonId(1)).unwrap();
        assert_eq!(list, vec![emb(4, 0.1), emb(4, 0.2)]);
    }

    #[test]
    fn test_add_rejects_wrong_dimension() {
        let mut store = EmbeddingStore::new(128);
        store.register(PersonId(1));
        let err = store.add(PersonId(1), emb(127, 0.0)).unwrap_err();
        assert!(matches!(err, Error::Validation { expected: 128, actual: 127 }));
        assert!(!store.has_any(PersonId(1)).unwrap());
    }

    #[test]
    fn test_add_unknown_person() {
        let mut store = EmbeddingStore::new(2);
        let err = store.add(PersonId(9), emb(2, 0.0)).unwrap_err();
        assert!(matches!(err, Error::PersonNotFound(PersonId(9))));
    }

    #[test]
    fn test_snapshot_is_detached_from_later_writes() {
        let mut store = EmbeddingStore::new(2);
        store.register(PersonId(1));
        store.add(PersonId(1), emb(2, 0.1)).unwrap();
        let before = store.snapshot(PersonId(1)).unwrap();
        store.add(PersonId(1), emb(2, 0.2)).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot(PersonId(1)).unwrap().len(), 2);
    }

    #[test]
    fn test_population_skips_people_without_embeddings() {
        let mut store = EmbeddingStore::new(2);
        store.register(PersonId(3));
        store.register(PersonId(1));
        store.register(PersonId(2));
        store.add(PersonId(3), emb(2, 0.3)).unwrap();
        store.add(PersonId(1), emb(2, 0.1)).unwrap();

        let pop = store.population().unwrap();
        let ids: Vec<_> = pop.keys().copied().collect();
        assert_eq!(ids, vec![PersonId(1), PersonId(3)]);
        assert!(!store.has_any(PersonId(2)).unwrap());
    }
}
