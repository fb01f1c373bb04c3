//! Face detection and embedding results produced by an external process.
//!
//! For an image `photo.jpg` the detector writes `photo.jpg.faces.json`:
//!
//! ```json
//! { "faces": [ { "crop": "crops/1.jpg", "confidence": 0.99, "embedding": [0.01, ...] } ] }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{l2_normalize, DetectedFace, FaceDetector, FaceEmbedder, FACE_EMBEDDING_DIM};

#[derive(Debug, Deserialize)]
struct SidecarFile {
    #[serde(default)]
    faces: Vec<DetectedFace>,
}

/// Reads `<image>.faces.json`.
#[derive(Debug, Default, Clone)]
pub struct SidecarDetector;

impl SidecarDetector {
    pub fn sidecar_path(image: &Path) -> PathBuf {
        let mut name = image.as_os_str().to_owned();
        name.push(".faces.json");
        PathBuf::from(name)
    }
}

impl FaceDetector for SidecarDetector {
    fn detect(&self, image: &Path) -> Result<Vec<DetectedFace>> {
        let path = Self::sidecar_path(image);
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("no face detections at {}", path.display()))?;
        let parsed: SidecarFile = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(parsed.faces)
    }
}

/// Uses the embedding carried in the detection, checked and re-normalized.
#[derive(Debug, Default, Clone)]
pub struct SidecarEmbedder;

impl FaceEmbedder for SidecarEmbedder {
    fn embed_face(&self, face: &DetectedFace) -> Result<Vec<f32>> {
        let raw = face
            .embedding
            .as_ref()
            .with_context(|| format!("no embedding for crop {}", face.crop.display()))?;
        anyhow::ensure!(
            raw.len() == FACE_EMBEDDING_DIM,
            "crop {} has {}-d embedding, expected {FACE_EMBEDDING_DIM}",
            face.crop.display(),
            raw.len()
        );
        l2_normalize(raw).with_context(|| format!("degenerate embedding for {}", face.crop.display()))
    }
}
