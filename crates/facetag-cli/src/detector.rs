//! Detection backed by precomputed encoder output.
//!
//! The face encoder runs outside facetag. For each image `photo.jpg` it leaves
//! `photo.jpg.faces.json`: a JSON array of `{"embedding": [...], "bbox": {...}}`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use facetag_core::{DetectedFace, Embedding, Error, FaceDetector, ImageSource, Result};

const SIDECAR_SUFFIX: &str = ".faces.json";

/// Reads `<image>.faces.json` next to each image.
pub struct SidecarDetector;

impl FaceDetector for SidecarDetector {
    fn detect(&self, image: &ImageSource) -> Result<Vec<DetectedFace>> {
        let path = match image {
            ImageSource::Path(path) => path,
            ImageSource::Bytes(_) => {
                return Err(Error::Detection(
                    "raw image bytes need an encoder; supply a .faces.json sidecar".into(),
                ))
            }
        };

        let sidecar = sidecar_path(path);
        let text = std::fs::read_to_string(&sidecar)
            .map_err(|e| Error::Detection(format!("{}: {e}", sidecar.display())))?;
        let faces: Vec<DetectedFace> = serde_json::from_str(&text)
            .map_err(|e| Error::Detection(format!("{}: {e}", sidecar.display())))?;

        tracing::debug!(image = %path.display(), faces = faces.len(), "sidecar read");
        Ok(faces)
    }
}

pub fn sidecar_path(image: &Path) -> PathBuf {
    let mut name = OsString::from(image.as_os_str());
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Read a pre-extracted embedding: a bare JSON array of floats.
pub fn read_embedding(path: &Path) -> anyhow::Result<Embedding> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
