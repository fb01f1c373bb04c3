//! On-disk blob for [`VectorIndex`] and atomic file replacement.
//!
//! The blob is a bincode-encoded [`PersistedIndex`]: magic, format version,
//! metric, dimension, then the row-major vector data.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Metric, VectorIndex};
use crate::error::IndexError;

const MAGIC: [u8; 4] = *b"MNVX";
const FORMAT_VERSION: u32 = 2;

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    magic: [u8; 4],
    version: u32,
    metric: Metric,
    dimension: u32,
    data: Vec<f32>,
}

pub(crate) fn encode(index: &VectorIndex, path: &Path) -> Result<Vec<u8>, IndexError> {
    let persisted = PersistedIndex {
        magic: MAGIC,
        version: FORMAT_VERSION,
        metric: index.metric,
        dimension: index.dimension as u32,
        data: index.data.clone(),
    };
    bincode::serialize(&persisted)
        .map_err(|e| IndexError::corrupt(path, format!("cannot encode index: {e}")))
}

pub(crate) fn decode(bytes: &[u8], path: &Path) -> Result<VectorIndex, IndexError> {
    let persisted: PersistedIndex =
        bincode::deserialize(bytes).map_err(|e| IndexError::corrupt(path, e.to_string()))?;

    if persisted.magic != MAGIC {
        return Err(IndexError::corrupt(path, "bad magic"));
    }
    if persisted.version != FORMAT_VERSION {
        return Err(IndexError::corrupt(
            path,
            format!("unsupported format version {}", persisted.version),
        ));
    }

    let dimension = persisted.dimension as usize;
    if dimension == 0 && !persisted.data.is_empty() {
        return Err(IndexError::corrupt(path, "zero dimension with stored rows"));
    }
    if dimension > 0 && persisted.data.len() % dimension != 0 {
        return Err(IndexError::corrupt(
            path,
            format!(
                "{} values do not divide into {dimension}-d rows",
                persisted.data.len()
            ),
        ));
    }

    Ok(VectorIndex {
        dimension,
        metric: persisted.metric,
        data: persisted.data,
    })
}

/// Temporary sibling used while replacing `path`.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write `bytes` to a temporary sibling and fsync it. Call [`commit`] to move it into place.
pub(crate) fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf, IndexError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(tmp)
}

/// Rename a staged temporary over its destination.
pub(crate) fn commit(tmp: &Path, path: &Path) -> Result<(), IndexError> {
    std::fs::rename(tmp, path)?;
    Ok(())
}
