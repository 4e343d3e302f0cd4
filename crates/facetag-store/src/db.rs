//! SQLite-backed store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use facetag_core::{
    Embedding, EmbeddingRepository, Error, PersonId, Photo, PhotoId, PhotoLedger, PhotoState,
    Population,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::schema::SCHEMA;

type Result<T> = std::result::Result<T, StoreError>;

/// A registered person.
#[derive(Debug, Clone, Serialize)]
pub struct PersonRecord {
    pub id: PersonId,
    pub name: String,
    pub email: String,
    pub created_at: String,
    pub embedding_count: usize,
}

/// A photo a person appears in, with the match confidence.
#[derive(Debug, Clone, Serialize)]
pub struct TaggedPhoto {
    pub photo: Photo,
    pub event_name: Option<String>,
    pub uploaded_by: Option<PersonId>,
    pub uploaded_at: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub people: usize,
    pub enrolled_people: usize,
    pub photos: usize,
    pub pending: usize,
    pub processed: usize,
    pub failed: usize,
}

pub struct Store {
    conn: Connection,
    dim: usize,
}

impl Store {
    /// Open (creating if needed) the database file. Embeddings must have `dim` values.
    pub fn open(path: &Path, dim: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "database opened");
        Self::with_connection(conn, dim)
    }

    pub fn open_in_memory(dim: usize) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, dim)
    }

    fn with_connection(conn: Connection, dim: usize) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", 1)?;
        Ok(Self { conn, dim })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn add_person(&self, name: &str, email: &str) -> Result<PersonId> {
        let existing: Option<i64> = self
            .conn
            .query_row("SELECT id FROM people WHERE email = ?1", [email], |row| {
                row.get(0)
            })
            .optional()?;
        if existing.is_some() {
            return Err(StoreError::DuplicateEmail(email.to_string()));
        }

        self.conn.execute(
            "INSERT INTO people (name, email, created_at) VALUES (?1, ?2, ?3)",
            params![name, email, now()],
        )?;
        let id = PersonId(self.conn.last_insert_rowid());
        tracing::info!(person = %id, name, "person registered");
        Ok(id)
    }

    pub fn person(&self, id: PersonId) -> Result<PersonRecord> {
        self.conn
            .query_row(
                "SELECT p.id, p.name, p.email, p.created_at,
                        (SELECT COUNT(*) FROM embeddings e WHERE e.person_id = p.id)
                 FROM people p WHERE p.id = ?1",
                [id.0],
                person_from_row,
            )
            .optional()?
            .ok_or(StoreError::Core(Error::PersonNotFound(id)))
    }

    pub fn people(&self) -> Result<Vec<PersonRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.name, p.email, p.created_at,
                    (SELECT COUNT(*) FROM embeddings e WHERE e.person_id = p.id)
             FROM people p ORDER BY p.id",
        )?;
        let people = stmt
            .query_map([], person_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(people)
    }

    /// Register an uploaded photo as pending, optionally attributed to the
    /// person who uploaded it.
    ///
    /// Identical content is stored once: re-adding it returns the existing id
    /// and `false`.
    pub fn add_photo(
        &self,
        file_path: &Path,
        content: &[u8],
        event_name: Option<&str>,
        uploaded_by: Option<PersonId>,
    ) -> Result<(PhotoId, bool)> {
        if let Some(uploader) = uploaded_by {
            if !self.person_exists(uploader)? {
                return Err(StoreError::Core(Error::PersonNotFound(uploader)));
            }
        }

        let hash = format!("{:x}", Sha256::digest(content));

        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM photos WHERE content_hash = ?1",
                [&hash],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            tracing::debug!(photo = id, path = %file_path.display(), "duplicate photo content");
            return Ok((PhotoId(id), false));
        }

        self.conn.execute(
            "INSERT INTO photos (file_path, content_hash, event_name, uploaded_by, uploaded_at, state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                file_path.to_string_lossy().into_owned(),
                hash,
                event_name,
                uploaded_by.map(|p| p.0),
                now(),
                PhotoState::Pending.code()
            ],
        )?;
        let id = PhotoId(self.conn.last_insert_rowid());
        tracing::info!(photo = %id, path = %file_path.display(), "photo added");
        Ok((id, true))
    }

    /// Photos a person has been identified in, oldest first.
    pub fn photos_of(&self, person: PersonId) -> Result<Vec<TaggedPhoto>> {
        if !self.person_exists(person)? {
            return Err(StoreError::Core(Error::PersonNotFound(person)));
        }

        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.file_path, p.state, p.event_name, p.uploaded_by, p.uploaded_at, pp.confidence
             FROM photo_people pp
             JOIN photos p ON p.id = pp.photo_id
             WHERE pp.person_id = ?1
             ORDER BY p.id",
        )?;
        let rows = stmt
            .query_map([person.0], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, f64>(6)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, path, state, event_name, uploaded_by, uploaded_at, confidence)| -> Result<TaggedPhoto> {
                Ok(TaggedPhoto {
                    photo: photo_from_parts(id, path, state)?,
                    event_name,
                    uploaded_by: uploaded_by.map(PersonId),
                    uploaded_at,
                    confidence: confidence as f32,
                })
            })
            .collect()
    }

    /// Put a failed photo back in the pending queue.
    pub fn reset(&self, id: PhotoId) -> Result<()> {
        let photo = self.load_photo(id)?;
        if photo.state != PhotoState::Failed {
            return Err(StoreError::Core(Error::InvalidTransition {
                photo: id,
                state: photo.state,
                expected: PhotoState::Failed,
            }));
        }
        self.conn.execute(
            "UPDATE photos SET state = ?1, processed_at = NULL WHERE id = ?2",
            params![PhotoState::Pending.code(), id.0],
        )?;
        tracing::info!(photo = %id, "photo reset to pending");
        Ok(())
    }

    pub fn stats(&self) -> Result<Stats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };
        let count_state = |state: PhotoState| -> Result<usize> {
            let n: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM photos WHERE state = ?1",
                [state.code()],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        };

        Ok(Stats {
            people: count("SELECT COUNT(*) FROM people")?,
            enrolled_people: count("SELECT COUNT(DISTINCT person_id) FROM embeddings")?,
            photos: count("SELECT COUNT(*) FROM photos")?,
            pending: count_state(PhotoState::Pending)?,
            processed: count_state(PhotoState::Processed)?,
            failed: count_state(PhotoState::Failed)?,
        })
    }

    /// Confidence per person for one photo.
    pub fn associations(&self, photo: PhotoId) -> Result<BTreeMap<PersonId, f32>> {
        let mut stmt = self.conn.prepare(
            "SELECT person_id, confidence FROM photo_people WHERE photo_id = ?1 ORDER BY person_id",
        )?;
        let rows = stmt
            .query_map([photo.0], |row| {
                Ok((PersonId(row.get(0)?), row.get::<_, f64>(1)? as f32))
            })?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
        Ok(rows)
    }

    fn person_exists(&self, person: PersonId) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT id FROM people WHERE id = ?1", [person.0], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn load_photo(&self, id: PhotoId) -> Result<Photo> {
        let row = self
            .conn
            .query_row(
                "SELECT id, file_path, state FROM photos WHERE id = ?1",
                [id.0],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)),
            )
            .optional()?;
        let (id, path, state) = row.ok_or(StoreError::Core(Error::PhotoNotFound(id)))?;
        photo_from_parts(id, path, state)
    }

    fn pending(&self) -> Result<Vec<Photo>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, file_path, state FROM photos WHERE state = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map([PhotoState::Pending.code()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, path, state)| photo_from_parts(id, path, state))
            .collect()
    }

    fn commit_processed(&mut self, id: PhotoId, associations: &BTreeMap<PersonId, f32>) -> Result<()> {
        let tx = self.conn.transaction()?;

        let state: Option<i64> = tx
            .query_row("SELECT state FROM photos WHERE id = ?1", [id.0], |row| row.get(0))
            .optional()?;
        let state = state.ok_or(StoreError::Core(Error::PhotoNotFound(id)))?;
        let state = PhotoState::from_code(state).ok_or(StoreError::BadState(state))?;
        if state != PhotoState::Pending {
            return Err(StoreError::Core(Error::InvalidTransition {
                photo: id,
                state,
                expected: PhotoState::Pending,
            }));
        }

        tx.execute(
            "UPDATE photos SET state = ?1, processed_at = ?2 WHERE id = ?3",
            params![PhotoState::Processed.code(), now(), id.0],
        )?;
        {
            let mut upsert = tx.prepare(
                "INSERT INTO photo_people (photo_id, person_id, confidence) VALUES (?1, ?2, ?3)
                 ON CONFLICT(photo_id, person_id) DO UPDATE SET confidence = excluded.confidence",
            )?;
            for (person, confidence) in associations {
                upsert.execute(params![id.0, person.0, *confidence as f64])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn mark_failed(&self, id: PhotoId) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE photos SET state = ?1, processed_at = ?2 WHERE id = ?3 AND state = ?4",
            params![
                PhotoState::Failed.code(),
                now(),
                id.0,
                PhotoState::Pending.code()
            ],
        )?;
        if updated == 0 {
            let photo = self.load_photo(id)?;
            return Err(StoreError::Core(Error::InvalidTransition {
                photo: id,
                state: photo.state,
                expected: PhotoState::Pending,
            }));
        }
        Ok(())
    }

    fn insert_embedding(&self, person: PersonId, embedding: &Embedding) -> Result<()> {
        embedding.check_dim(self.dim)?;
        if !self.person_exists(person)? {
            return Err(StoreError::Core(Error::PersonNotFound(person)));
        }
        let vector = serde_json::to_string(embedding)?;
        self.conn.execute(
            "INSERT INTO embeddings (person_id, vector, created_at) VALUES (?1, ?2, ?3)",
            params![person.0, vector, now()],
        )?;
        Ok(())
    }

    fn load_embeddings(&self, person: PersonId) -> Result<Vec<Embedding>> {
        if !self.person_exists(person)? {
            return Err(StoreError::Core(Error::PersonNotFound(person)));
        }
        let mut stmt = self
            .conn
            .prepare("SELECT vector FROM embeddings WHERE person_id = ?1 ORDER BY id")?;
        let vectors = stmt
            .query_map([person.0], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        vectors.iter().map(|v| self.decode_embedding(v)).collect()
    }

    /// Stored rows written under a different `dim` are rejected, not matched.
    fn decode_embedding(&self, vector: &str) -> Result<Embedding> {
        let embedding: Embedding = serde_json::from_str(vector)?;
        embedding.check_dim(self.dim)?;
        Ok(embedding)
    }

    fn load_population(&self) -> Result<Population> {
        let mut stmt = self
            .conn
            .prepare("SELECT person_id, vector FROM embeddings ORDER BY person_id, id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut population = Population::new();
        for (person, vector) in rows {
            let embedding = self.decode_embedding(&vector)?;
            population.entry(PersonId(person)).or_default().push(embedding);
        }
        Ok(population)
    }
}

impl EmbeddingRepository for Store {
    fn contains_person(&self, person: PersonId) -> facetag_core::Result<bool> {
        Ok(self.person_exists(person)?)
    }

    fn add(&mut self, person: PersonId, embedding: Embedding) -> facetag_core::Result<()> {
        Ok(self.insert_embedding(person, &embedding)?)
    }

    fn embeddings(&self, person: PersonId) -> facetag_core::Result<Vec<Embedding>> {
        Ok(self.load_embeddings(person)?)
    }

    fn population(&self) -> facetag_core::Result<Population> {
        Ok(self.load_population()?)
    }
}

impl PhotoLedger for Store {
    fn pending_photos(&self) -> facetag_core::Result<Vec<Photo>> {
        Ok(self.pending()?)
    }

    fn photo(&self, id: PhotoId) -> facetag_core::Result<Photo> {
        Ok(self.load_photo(id)?)
    }

    fn complete(
        &mut self,
        id: PhotoId,
        associations: &BTreeMap<PersonId, f32>,
    ) -> facetag_core::Result<()> {
        Ok(self.commit_processed(id, associations)?)
    }

    fn fail(&mut self, id: PhotoId) -> facetag_core::Result<()> {
        Ok(self.mark_failed(id)?)
    }
}

fn person_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersonRecord> {
    Ok(PersonRecord {
        id: PersonId(row.get(0)?),
        name: row.get(1)?,
        email: row.get(2)?,
        created_at: row.get(3)?,
        embedding_count: row.get::<_, i64>(4)? as usize,
    })
}

fn photo_from_parts(id: i64, path: String, state: i64) -> Result<Photo> {
    Ok(Photo {
        id: PhotoId(id),
        file_path: PathBuf::from(path),
        state: PhotoState::from_code(state).ok_or(StoreError::BadState(state))?,
    })
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
