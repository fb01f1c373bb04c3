//! Face identity resolution.
//!
//! Two independent views over the same face-embedding population:
//!
//! - **Online matching** ([`FaceIdentityEngine::ingest_faces`]): each new face is
//!   compared with its single nearest neighbor in the face index. Above the match
//!   threshold it inherits that face's current label. Every face is indexed
//!   either way; photos of the same person are separate rows sharing a label.
//! - **Offline clustering** ([`cluster`]): DBSCAN over the whole population,
//!   recomputable on demand. It never touches the index and only feeds
//!   [`labels::LabelPropagationManager`].

pub mod cluster;
pub mod labels;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::FaceConfig;
use crate::embedding::{DetectedFace, FaceEmbedder};
use crate::index::IdIndex;
use crate::memory::store;
use cluster::{cluster_embeddings, ClusterParams};

/// Outcome of ingesting one detected face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceMatch {
    pub face_id: String,
    pub crop: PathBuf,
    /// Label inherited from the matched face, if any.
    pub label: Option<String>,
    /// The nearest existing face, when it cleared the match threshold.
    pub matched_face: Option<String>,
    pub similarity: Option<f32>,
}

/// One face similarity search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceHit {
    pub face_id: String,
    pub similarity: f32,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FaceIdentityEngine {
    match_threshold: f32,
    search_top_k: usize,
    cluster_params: ClusterParams,
}

impl Default for FaceIdentityEngine {
    fn default() -> Self {
        Self::new(&FaceConfig::default())
    }
}

impl FaceIdentityEngine {
    pub fn new(config: &FaceConfig) -> Self {
        Self {
            match_threshold: config.match_threshold,
            search_top_k: config.search_top_k,
            cluster_params: ClusterParams::from(config),
        }
    }

    /// Nearest indexed face if its similarity is strictly above the match threshold.
    pub fn nearest_match(
        &self,
        index: &IdIndex<String>,
        embedding: &[f32],
    ) -> Result<Option<(String, f32)>> {
        let nearest = index.search(embedding, 1)?.into_iter().next();
        Ok(nearest
            .filter(|hit| hit.score > self.match_threshold)
            .map(|hit| (hit.id, hit.score)))
    }

    /// Embed, match, record, and index every face detected in one image.
    ///
    /// A face whose embedding fails (unreadable crop, zero-norm or wrong-sized
    /// vector) is skipped; the rest of the image is still processed.
    pub fn ingest_faces(
        &self,
        conn: &Connection,
        index: &mut IdIndex<String>,
        image: &Path,
        faces: &[DetectedFace],
        embedder: &dyn FaceEmbedder,
    ) -> Result<Vec<FaceMatch>> {
        let image_path = image.to_string_lossy();
        let mut added = Vec::with_capacity(faces.len());

        for face in faces {
            let embedding = match embedder.embed_face(face) {
                Ok(v) if v.len() == index.dimension() => v,
                Ok(v) => {
                    warn!(
                        crop = %face.crop.display(),
                        expected = index.dimension(),
                        actual = v.len(),
                        "face embedding has wrong dimension, skipping"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(crop = %face.crop.display(), error = %e, "face embedding failed, skipping");
                    continue;
                }
            };

            let matched = self.nearest_match(index, &embedding)?;
            let label = match &matched {
                Some((matched_id, _)) => store::get_face_label(conn, matched_id)?,
                None => None,
            };

            let face_id = uuid::Uuid::now_v7().to_string();
            store::insert_face(conn, &face_id, &image_path, label.as_deref())?;
            index.add(face_id.clone(), &embedding)?;

            debug!(
                face_id = %face_id,
                matched = matched.is_some(),
                label = label.as_deref().unwrap_or("-"),
                "face indexed"
            );
            let (matched_face, similarity) = match matched {
                Some((id, score)) => (Some(id), Some(score)),
                None => (None, None),
            };
            added.push(FaceMatch {
                face_id,
                crop: face.crop.clone(),
                label,
                matched_face,
                similarity,
            });
        }

        info!(
            image = %image.display(),
            detected = faces.len(),
            indexed = added.len(),
            "faces ingested"
        );
        Ok(added)
    }

    /// Most similar indexed faces, with their current label snapshots.
    pub fn search(
        &self,
        conn: &Connection,
        index: &IdIndex<String>,
        embedding: &[f32],
    ) -> Result<Vec<FaceHit>> {
        index
            .search(embedding, self.search_top_k)?
            .into_iter()
            .map(|hit| {
                Ok(FaceHit {
                    label: store::get_face_label(conn, &hit.id)?,
                    face_id: hit.id,
                    similarity: hit.score,
                })
            })
            .collect()
    }

    /// Cluster the whole indexed population. `face_id -> cluster_id`, `-1` for noise.
    pub fn cluster(&self, index: &IdIndex<String>) -> BTreeMap<String, i64> {
        let faces: Vec<(String, &[f32])> = index
            .entries()
            .map(|(id, vector)| (id.clone(), vector))
            .collect();
        let clusters = cluster_embeddings(&faces, self.cluster_params);

        let identities = clusters
            .values()
            .filter(|&&c| c != cluster::NOISE)
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        let noise = clusters.values().filter(|&&c| c == cluster::NOISE).count();
        info!(faces = clusters.len(), identities, noise, "faces clustered");
        clusters
    }
}
