#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use mnemos::config::MnemosConfig;
use mnemos::db;
use mnemos::embedding::{DetectedFace, EmbeddingProvider, FaceDetector, FACE_EMBEDDING_DIM};
use mnemos::engine::MemoryEngine;
use rusqlite::Connection;

/// Dimension of [`KeywordEmbedder`] vectors.
pub const KEYWORD_DIM: usize = 1024;

/// Open a fresh in-memory database with schema applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Deterministic bag-of-words embedder: each lower-cased word lights one bucket.
/// Texts sharing words have high cosine similarity; unrelated texts are near zero.
pub struct KeywordEmbedder;

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % KEYWORD_DIM as u64) as usize
}

impl EmbeddingProvider for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; KEYWORD_DIM];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            v[bucket(word)] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        anyhow::ensure!(norm > 0.0, "nothing to embed");
        Ok(v.into_iter().map(|x| x / norm).collect())
    }

    fn dimensions(&self) -> usize {
        KEYWORD_DIM
    }
}

/// Engine over an in-memory database with the keyword embedder.
pub fn test_engine() -> MemoryEngine {
    MemoryEngine::in_memory(&MnemosConfig::default(), Arc::new(KeywordEmbedder)).unwrap()
}

/// Config whose data directory is `dir`.
pub fn config_in(dir: &Path) -> MnemosConfig {
    let mut config = MnemosConfig::default();
    config.storage.data_dir = dir.to_string_lossy().into_owned();
    config
}

/// Engine persisted under `dir`.
pub fn engine_in(dir: &Path) -> Result<MemoryEngine> {
    MemoryEngine::open(&config_in(dir), Arc::new(KeywordEmbedder))
}

/// Generate a deterministic 512-dim unit face embedding with a spike at position `seed`.
pub fn face_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; FACE_EMBEDDING_DIM];
    v[seed % FACE_EMBEDDING_DIM] = 1.0;
    v
}

/// A unit vector close to `face_embedding(seed)`: cosine `cos(angle)` toward a
/// second axis picked by `wobble`.
pub fn near_face(seed: usize, wobble: usize, angle: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; FACE_EMBEDDING_DIM];
    v[seed % FACE_EMBEDDING_DIM] = angle.cos();
    v[(seed + 1 + wobble) % FACE_EMBEDDING_DIM] = angle.sin();
    v
}

pub fn detected(crop: &str, embedding: Vec<f32>) -> DetectedFace {
    DetectedFace {
        crop: PathBuf::from(crop),
        confidence: 0.99,
        embedding: Some(embedding),
    }
}

/// Detector that returns a fixed set of faces for any image.
pub struct StubDetector(pub Vec<DetectedFace>);

impl FaceDetector for StubDetector {
    fn detect(&self, _image: &Path) -> Result<Vec<DetectedFace>> {
        Ok(self.0.clone())
    }
}

/// [`KeywordEmbedder`] that refuses any text containing "unembeddable" and
/// counts every call.
pub struct CountingEmbedder {
    pub calls: Arc<AtomicUsize>,
}

impl EmbeddingProvider for CountingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(!text.contains("unembeddable"), "embedder rejected text");
        KeywordEmbedder.embed(text)
    }

    fn dimensions(&self) -> usize {
        KEYWORD_DIM
    }
}
