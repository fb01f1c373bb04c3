//! CLI `rebuild` command: re-embed every stored memory with the configured model.

use std::sync::Arc;

use anyhow::Result;

use mnemos::engine::MemoryEngine;

pub async fn rebuild(engine: Arc<MemoryEngine>, model: &str) -> Result<()> {
    println!("Rebuilding text index with model '{model}'...");

    let pb = super::progress_bar(0)?;
    let bar = pb.clone();
    let count = tokio::task::spawn_blocking(move || {
        engine.rebuild_text_index(|done, total| {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
        })
    })
    .await??;
    pb.finish_and_clear();

    println!("Indexed {count} memories.");
    Ok(())
}
