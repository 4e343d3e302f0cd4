/// Tables are created idempotently on every `initialize`.
///
/// `photos.state`: 0 pending, 1 processed, -1 failed.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS people (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    email       TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS embeddings (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id   INTEGER NOT NULL REFERENCES people(id),
    vector      TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_embeddings_person ON embeddings(person_id, id);

CREATE TABLE IF NOT EXISTS photos (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path     TEXT NOT NULL,
    content_hash  TEXT NOT NULL UNIQUE,
    event_name    TEXT,
    uploaded_by   INTEGER REFERENCES people(id),
    uploaded_at   TEXT NOT NULL,
    state         INTEGER NOT NULL DEFAULT 0,
    processed_at  TEXT
);

CREATE INDEX IF NOT EXISTS idx_photos_state ON photos(state);

CREATE TABLE IF NOT EXISTS photo_people (
    photo_id    INTEGER NOT NULL REFERENCES photos(id),
    person_id   INTEGER NOT NULL REFERENCES people(id),
    confidence  REAL NOT NULL DEFAULT 0.0,
    PRIMARY KEY (photo_id, person_id)
);
"#;
