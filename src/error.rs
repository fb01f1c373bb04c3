//! Structural error types.
//!
//! Only failures that the caller must handle are typed here. Per-item problems
//! (one bad face crop, one record that fails to embed) are logged and skipped
//! where they occur and never surface as errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the vector index and its on-disk representation.
#[derive(Debug, Error)]
pub enum IndexError {
    /// An index file exists but cannot be parsed, or the blob and the
    /// identifier array disagree.
    #[error("corrupt index at {}: {reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    /// A vector does not have the index's dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptIndex {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by cluster label management.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    /// The noise bucket (`-1`) can never carry a label.
    #[error("cluster {0} is the noise bucket and cannot be labeled")]
    InvalidCluster(i64),

    #[error("cluster {0} has no label to rename")]
    LabelNotFound(i64),
}
