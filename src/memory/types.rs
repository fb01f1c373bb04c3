//! Record types owned by the relational store.

use serde::{Deserialize, Serialize};

/// A stored text fragment. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub content: String,
    pub created_at: String,
}

/// Kind of uploaded source file, derived purely from its filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Image,
    Pdf,
    Excel,
}

impl FileType {
    /// `.pdf` is a PDF, `.xls`/`.xlsx` a spreadsheet, anything else an image.
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_lowercase();
        if lower.ends_with(".pdf") {
            Self::Pdf
        } else if lower.ends_with(".xls") || lower.ends_with(".xlsx") {
            Self::Excel
        } else {
            Self::Image
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Excel => "excel",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded file that one or more memories were extracted from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub filename: String,
    pub file_path: String,
}

/// One observed face.
///
/// `label` is a snapshot for fast lookup. The authoritative label belongs to the
/// face's identity cluster and is copied here on reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: String,
    pub image_path: String,
    pub label: Option<String>,
    pub created_at: String,
}
