//! Exact nearest-neighbor search over dense fixed-dimension vectors.
//!
//! [`VectorIndex`] stores rows in insertion order; a row's position is the join
//! key back to whatever record produced it. Positions are append-only and never
//! reordered, so a caller-held identifier array stays valid as long as it is
//! pushed in the same order. [`IdIndex`] bundles the two and is what the rest of
//! the crate uses.
//!
//! Two metrics are supported:
//!
//! | Metric | Used for | Score | Best-first order |
//! |--------|----------|-------|------------------|
//! | [`Metric::L2`] | text memories (384-d) | squared Euclidean distance | ascending |
//! | [`Metric::InnerProduct`] | faces (512-d, unit norm) | dot product | descending |

mod file;
mod mapped;

pub use mapped::{IdIndex, IndexFiles, ScoredId};

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Distance or similarity used to rank rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Squared Euclidean distance. Smaller is better.
    L2,
    /// Inner product on L2-normalized vectors, i.e. cosine similarity. Larger is better.
    InnerProduct,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::InnerProduct => "inner_product",
        }
    }

    fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Self::InnerProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        }
    }

    /// Order two scores best-first.
    fn rank(self, a: f32, b: f32) -> std::cmp::Ordering {
        match self {
            Self::L2 => a.total_cmp(&b),
            Self::InnerProduct => b.total_cmp(&a),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One search hit: the row position and its metric score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub score: f32,
}

/// Flat, exact vector index. Rows live contiguously in one buffer.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    metric: Metric,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index.
    pub fn new(dimension: usize, metric: Metric) -> Self {
        Self {
            dimension,
            metric,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append one row and return its position.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, IndexError> {
        self.check_dimension(vector)?;
        let position = self.len();
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    /// The row stored at `position`, if any.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Return at most `k` rows ordered best-first. Equal scores keep insertion order.
    ///
    /// An empty index answers with an empty list for any query, including one of
    /// the wrong dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(query)?;

        let mut hits: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                score: self.metric.score(query, row),
            })
            .collect();

        // sort_by is stable, so ties stay in position order
        hits.sort_by(|a, b| self.metric.rank(a.score, b.score));
        hits.truncate(k);
        Ok(hits)
    }

    /// Drop every row.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}
