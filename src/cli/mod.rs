pub mod ask;
pub mod doctor;
pub mod faces;
pub mod memory;
pub mod rebuild;

use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use mnemos::config::MnemosConfig;
use mnemos::embedding::{self, EmbeddingProvider};
use mnemos::engine::MemoryEngine;

/// Load the text embedding model and open the engine over the configured data directory.
///
/// Model loading and index loading both block, so this runs off the async runtime.
pub async fn open_engine(config: &MnemosConfig) -> Result<Arc<MemoryEngine>> {
    let config = config.clone();
    let engine = tokio::task::spawn_blocking(move || -> Result<MemoryEngine> {
        let provider: Arc<dyn EmbeddingProvider> = Arc::from(
            embedding::create_provider(&config.embedding)
                .context("failed to create embedding provider")?,
        );
        MemoryEngine::open(&config, provider)
    })
    .await??;
    Ok(Arc::new(engine))
}

fn progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

fn preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}
