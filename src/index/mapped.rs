//! [`IdIndex`]: a [`VectorIndex`] kept in lockstep with its identifier array.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::file;
use super::{Metric, VectorIndex};
use crate::error::IndexError;

/// The pair of files an [`IdIndex`] persists to. Both are always written and read together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFiles {
    /// Binary vector blob.
    pub blob: PathBuf,
    /// JSON array of identifiers, positionally parallel to the blob's rows.
    pub ids: PathBuf,
}

impl IndexFiles {
    /// `<dir>/<stem>.index` and `<dir>/<stem>.ids.json`.
    pub fn in_dir(dir: impl AsRef<Path>, stem: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            blob: dir.join(format!("{stem}.index")),
            ids: dir.join(format!("{stem}.ids.json")),
        }
    }
}

/// A search hit resolved to its record identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId<Id> {
    pub id: Id,
    pub score: f32,
}

/// Vector index plus the identifier of the record behind each row.
///
/// `ids.len() == index.len()` holds after every operation: a vector that fails
/// to insert never advances the identifier array.
#[derive(Debug, Clone)]
pub struct IdIndex<Id> {
    index: VectorIndex,
    ids: Vec<Id>,
}

impl<Id> IdIndex<Id>
where
    Id: Clone + Serialize + DeserializeOwned,
{
    pub fn new(dimension: usize, metric: Metric) -> Self {
        Self {
            index: VectorIndex::new(dimension, metric),
            ids: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn metric(&self) -> Metric {
        self.index.metric()
    }

    /// Identifiers in insertion order.
    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    /// Append one vector and its identifier.
    pub fn add(&mut self, id: Id, vector: &[f32]) -> Result<(), IndexError> {
        self.index.add(vector)?;
        self.ids.push(id);
        Ok(())
    }

    /// Best-first hits with identifiers attached.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId<Id>>, IndexError> {
        let hits = self.index.search(query, k)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                self.ids.get(hit.position).map(|id| ScoredId {
                    id: id.clone(),
                    score: hit.score,
                })
            })
            .collect())
    }

    /// Every `(identifier, vector)` pair in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&Id, &[f32])> + '_ {
        self.ids
            .iter()
            .enumerate()
            .filter_map(move |(position, id)| self.index.vector(position).map(|v| (id, v)))
    }

    /// Replace all contents with vectors from a full source snapshot.
    /// On error the previous contents are kept.
    pub fn rebuild<I>(&mut self, source: I) -> Result<usize, IndexError>
    where
        I: IntoIterator<Item = (Id, Vec<f32>)>,
    {
        let mut fresh = Self::new(self.dimension(), self.metric());
        for (id, vector) in source {
            fresh.add(id, &vector)?;
        }
        *self = fresh;
        debug!(count = self.len(), "index rebuilt");
        Ok(self.len())
    }

    /// Write both files atomically: each is staged to a temporary and renamed into place.
    pub fn persist(&self, files: &IndexFiles) -> Result<(), IndexError> {
        let ids_json = serde_json::to_vec(&self.ids)
            .map_err(|e| IndexError::corrupt(&files.ids, format!("cannot encode ids: {e}")))?;

        let blob_tmp = file::stage(&files.blob, &file::encode(&self.index, &files.blob)?)?;
        let ids_tmp = file::stage(&files.ids, &ids_json)?;
        file::commit(&blob_tmp, &files.blob)?;
        file::commit(&ids_tmp, &files.ids)?;

        debug!(
            count = self.len(),
            blob = %files.blob.display(),
            "index persisted"
        );
        Ok(())
    }

    /// Load a persisted index, or start empty when neither file exists.
    ///
    /// A present-but-unreadable pair, a pair with only one file, a blob built with
    /// a different metric or dimension, or an identifier array whose length differs
    /// from the row count all fail with [`IndexError::CorruptIndex`].
    pub fn load(files: &IndexFiles, dimension: usize, metric: Metric) -> Result<Self, IndexError> {
        match (files.blob.exists(), files.ids.exists()) {
            (false, false) => {
                info!(
                    blob = %files.blob.display(),
                    dimension,
                    metric = %metric,
                    "no index on disk, starting empty"
                );
                return Ok(Self::new(dimension, metric));
            }
            (true, false) => {
                return Err(IndexError::corrupt(&files.ids, "identifier file missing"));
            }
            (false, true) => {
                return Err(IndexError::corrupt(&files.blob, "vector blob missing"));
            }
            (true, true) => {}
        }

        let bytes = std::fs::read(&files.blob)?;
        let index = file::decode(&bytes, &files.blob)?;
        if index.metric() != metric {
            return Err(IndexError::corrupt(
                &files.blob,
                format!("metric is {}, expected {metric}", index.metric()),
            ));
        }
        if index.dimension() != dimension {
            return Err(IndexError::corrupt(
                &files.blob,
                format!("dimension is {}, expected {dimension}", index.dimension()),
            ));
        }

        let raw_ids = std::fs::read(&files.ids)?;
        let ids: Vec<Id> = serde_json::from_slice(&raw_ids)
            .map_err(|e| IndexError::corrupt(&files.ids, e.to_string()))?;
        if ids.len() != index.len() {
            return Err(IndexError::corrupt(
                &files.ids,
                format!("{} identifiers for {} vectors", ids.len(), index.len()),
            ));
        }

        info!(count = ids.len(), blob = %files.blob.display(), "index loaded");
        Ok(Self { index, ids })
    }
}
