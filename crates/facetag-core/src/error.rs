use crate::types::{PersonId, PhotoId, PhotoState};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("embedding has {actual} dimensions, expected {expected}")]
    Validation { expected: usize, actual: usize },
    #[error("enrollment accepted {accepted} samples, at least {required} required")]
    InsufficientSamples { accepted: usize, required: usize },
    #[error("face detection failed: {0}")]
    Detection(String),
    #[error("person not found: {0}")]
    PersonNotFound(PersonId),
    #[error("photo not found: {0}")]
    PhotoNotFound(PhotoId),
    #[error("photo {photo} is {state}, expected {expected}")]
    InvalidTransition {
        photo: PhotoId,
        state: PhotoState,
        expected: PhotoState,
    },
    #[error("storage: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
