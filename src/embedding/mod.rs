//! Embedding collaborators.
//!
//! Text vectors come from an [`EmbeddingProvider`] (384-d, all-MiniLM-L6-v2 by
//! default, see [`local`]). Faces come from a [`FaceDetector`] that finds crops in
//! an image and a [`FaceEmbedder`] that turns one crop into a 512-d unit vector.
//! Detection and face models run outside this crate; [`sidecar`] reads their
//! output from a JSON file next to the image.

pub mod local;
pub mod sidecar;

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Dimension of text embeddings (all-MiniLM-L6-v2).
pub const EMBEDDING_DIM: usize = 384;

/// Dimension of face embeddings (FaceNet / VGGFace2).
pub const FACE_EMBEDDING_DIM: usize = 512;

/// Turns text into a fixed-length vector. Deterministic for identical input.
///
/// All methods are synchronous; async callers should use `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// A face found in an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    /// Path of the cropped face image.
    pub crop: PathBuf,
    /// Detector confidence. Carried through for display only.
    #[serde(default)]
    pub confidence: f32,
    /// Embedding computed alongside detection, when the detector provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Finds faces in an image. An image with no faces yields an empty list.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &Path) -> Result<Vec<DetectedFace>>;
}

/// Turns one face crop into a unit-norm vector of [`FACE_EMBEDDING_DIM`] dimensions.
///
/// Fails for unreadable crops and degenerate (zero-norm) outputs.
pub trait FaceEmbedder: Send + Sync {
    fn embed_face(&self, face: &DetectedFace) -> Result<Vec<f32>>;
}

/// Create the text embedding provider named in config.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => Ok(Box::new(local::LocalEmbeddingProvider::new(config)?)),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local"),
    }
}

/// L2-normalize a vector. Returns `None` when the norm is zero or not finite.
pub fn l2_normalize(v: &[f32]) -> Option<Vec<f32>> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        Some(v.iter().map(|x| x / norm).collect())
    } else {
        None
    }
}

/// Cosine similarity. Zero when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_unit_length() {
        let n = l2_normalize(&[3.0, 4.0]).unwrap();
        assert!((n[0] - 0.6).abs() < 1e-6);
        assert!((n[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_zero_vector_is_none() {
        assert!(l2_normalize(&[0.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn cosine_handles_scale_and_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[5.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 2.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
