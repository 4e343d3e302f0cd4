use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("embedding encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("email already registered: {0}")]
    DuplicateEmail(String),
    #[error("unknown photo state code {0}")]
    BadState(i64),
    #[error(transparent)]
    Core(#[from] facetag_core::Error),
}

impl From<StoreError> for facetag_core::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Core(inner) => inner,
            other => facetag_core::Error::Storage(other.to_string()),
        }
    }
}
