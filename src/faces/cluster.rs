//! Offline identity clustering: DBSCAN under cosine distance.
//!
//! A face is a *core* face when at least `min_samples` faces (itself included)
//! lie within cosine distance `eps`. Clusters grow from core faces in input
//! order; border faces join the first cluster that reaches them. Everything
//! else is noise ([`NOISE`]). The result depends only on the input order and
//! values, so rerunning on the same population gives the same ids. Ids are not
//! stable once the population changes.

use std::collections::BTreeMap;

use crate::config::FaceConfig;
use crate::embedding::l2_normalize;

/// Cluster id reserved for faces that belong to no identity.
pub const NOISE: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Neighborhood radius in cosine distance (`1 - cosine similarity`).
    pub eps: f32,
    /// Faces needed in a neighborhood, including the face itself, to seed a cluster.
    pub min_samples: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            eps: 0.35,
            min_samples: 3,
        }
    }
}

impl From<&FaceConfig> for ClusterParams {
    fn from(config: &FaceConfig) -> Self {
        Self {
            eps: config.cluster_eps,
            min_samples: config.cluster_min_size,
        }
    }
}

/// Partition `(face_id, embedding)` pairs into identities. Returns `face_id -> cluster_id`.
pub fn cluster_embeddings<Id, V>(faces: &[(Id, V)], params: ClusterParams) -> BTreeMap<Id, i64>
where
    Id: Clone + Ord,
    V: AsRef<[f32]>,
{
    let unit: Vec<Option<Vec<f32>>> = faces.iter().map(|(_, v)| l2_normalize(v.as_ref())).collect();
    let neighborhoods: Vec<Vec<usize>> = (0..faces.len())
        .map(|i| {
            (0..faces.len())
                .filter(|&j| i == j || cosine_distance(&unit[i], &unit[j]) <= params.eps)
                .collect()
        })
        .collect();
    let core: Vec<bool> = neighborhoods
        .iter()
        .map(|n| n.len() >= params.min_samples)
        .collect();

    let mut labels = vec![NOISE; faces.len()];
    let mut next_cluster = 0i64;
    for seed in 0..faces.len() {
        if labels[seed] != NOISE || !core[seed] {
            continue;
        }
        labels[seed] = next_cluster;
        let mut stack = vec![seed];
        while let Some(point) = stack.pop() {
            if !core[point] {
                continue;
            }
            for &neighbor in &neighborhoods[point] {
                if labels[neighbor] == NOISE {
                    labels[neighbor] = next_cluster;
                    stack.push(neighbor);
                }
            }
        }
        next_cluster += 1;
    }

    faces
        .iter()
        .zip(labels)
        .map(|((id, _), label)| (id.clone(), label))
        .collect()
}

/// Degenerate (zero-norm) vectors are maximally distant from everything.
fn cosine_distance(a: &Option<Vec<f32>>, b: &Option<Vec<f32>>) -> f32 {
    match (a, b) {
        (Some(a), Some(b)) => {
            let cos: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            (1.0 - cos).max(0.0)
        }
        _ => 1.0,
    }
}
