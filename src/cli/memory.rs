//! CLI `remember` and `upload` commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use mnemos::engine::MemoryEngine;

pub async fn remember(engine: Arc<MemoryEngine>, content: String) -> Result<()> {
    let id = tokio::task::spawn_blocking(move || engine.remember(&content)).await??;
    println!("Stored memory {id}.");
    Ok(())
}

/// Record a file and store its text. Only `.txt` files are read directly;
/// anything else needs its text supplied through `--text-file`.
pub async fn upload(engine: Arc<MemoryEngine>, file: PathBuf, text_file: Option<PathBuf>) -> Result<()> {
    let file = std::fs::canonicalize(&file)
        .with_context(|| format!("file not found: {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("not a file: {}", file.display()))?;
    let text = extracted_text(&file, text_file.as_deref())?;

    let file_path = file.to_string_lossy().into_owned();
    let result = tokio::task::spawn_blocking(move || {
        engine.ingest_document(&filename, &file_path, &text)
    })
    .await??;

    match result.memory_id {
        Some(memory_id) => println!(
            "Stored document {} with text as memory {memory_id}.",
            result.document_id
        ),
        None => println!(
            "Stored document {} (no text extracted).",
            result.document_id
        ),
    }
    Ok(())
}

fn extracted_text(file: &Path, text_file: Option<&Path>) -> Result<String> {
    if let Some(path) = text_file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read text file: {}", path.display()));
    }
    let is_plain_text = file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
    if is_plain_text {
        std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))
    } else {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_file_takes_precedence() {
        let dir = tempfile::TempDir::new().unwrap();
        let scan = dir.path().join("scan.pdf");
        let text = dir.path().join("scan.txt");
        std::fs::write(&scan, b"%PDF").unwrap();
        std::fs::write(&text, "extracted words").unwrap();

        assert_eq!(extracted_text(&scan, Some(&text)).unwrap(), "extracted words");
        assert_eq!(extracted_text(&scan, None).unwrap(), "");
        assert_eq!(extracted_text(&text, None).unwrap(), "extracted words");
    }
}
