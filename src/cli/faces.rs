//! CLI `faces` commands.
//!
//! Detection and embedding happen outside this binary; `faces add` reads the
//! `<image>.faces.json` file written next to the image.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use mnemos::embedding::sidecar::{SidecarDetector, SidecarEmbedder};
use mnemos::embedding::{FaceDetector, FaceEmbedder};
use mnemos::engine::MemoryEngine;
use mnemos::faces::cluster::NOISE;

pub async fn add(engine: Arc<MemoryEngine>, image: PathBuf) -> Result<()> {
    let shown = image.display().to_string();
    let matches = tokio::task::spawn_blocking(move || {
        engine.add_faces(&image, &SidecarDetector, &SidecarEmbedder)
    })
    .await??;

    if matches.is_empty() {
        println!("No faces added from {shown}.");
        return Ok(());
    }
    println!("Added {} face(s) from {shown}:", matches.len());
    for m in &matches {
        let sim = m.similarity.unwrap_or_default();
        match (&m.matched_face, &m.label) {
            (Some(_), Some(label)) => println!("  {} -> {label} (similarity {sim:.3})", m.face_id),
            (Some(other), None) => println!("  {} matches {other} (similarity {sim:.3})", m.face_id),
            (None, _) => println!("  {} (new identity)", m.face_id),
        }
    }
    Ok(())
}

/// Search with the first face detected in `image`.
pub async fn search(engine: Arc<MemoryEngine>, image: PathBuf) -> Result<()> {
    let hits = tokio::task::spawn_blocking(move || -> Result<_> {
        let face = SidecarDetector
            .detect(&image)?
            .into_iter()
            .next()
            .with_context(|| format!("no face detected in {}", image.display()))?;
        let embedding = SidecarEmbedder.embed_face(&face)?;
        engine.search_faces(&embedding)
    })
    .await??;

    if hits.is_empty() {
        println!("No faces indexed yet.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "  {}. {} [{}] similarity {:.3}",
            i + 1,
            hit.face_id,
            hit.label.as_deref().unwrap_or("unlabeled"),
            hit.similarity
        );
    }
    Ok(())
}

pub async fn cluster(engine: Arc<MemoryEngine>) -> Result<()> {
    let (clusters, labels) = tokio::task::spawn_blocking(move || -> Result<_> {
        Ok((engine.cluster_faces()?, engine.labels()?))
    })
    .await??;

    if clusters.is_empty() {
        println!("No faces indexed yet.");
        return Ok(());
    }

    let mut members: std::collections::BTreeMap<i64, Vec<&str>> = Default::default();
    for (face_id, cluster_id) in &clusters {
        members.entry(*cluster_id).or_default().push(face_id);
    }
    for (cluster_id, faces) in &members {
        let name = if *cluster_id == NOISE {
            "noise".to_string()
        } else {
            match labels.get(cluster_id) {
                Some(label) => format!("cluster {cluster_id} ({label})"),
                None => format!("cluster {cluster_id}"),
            }
        };
        println!("{name}: {} face(s)", faces.len());
        for face in faces {
            println!("  {face}");
        }
    }
    Ok(())
}

pub async fn set_label(engine: Arc<MemoryEngine>, cluster_id: i64, label: String) -> Result<()> {
    let shown = label.clone();
    tokio::task::spawn_blocking(move || engine.set_label(cluster_id, &label)).await??;
    println!("Cluster {cluster_id} labeled '{shown}'.");
    Ok(())
}

pub async fn rename_label(engine: Arc<MemoryEngine>, cluster_id: i64, label: String) -> Result<()> {
    let shown = label.clone();
    tokio::task::spawn_blocking(move || engine.rename_label(cluster_id, &label)).await??;
    println!("Cluster {cluster_id} renamed to '{shown}'.");
    Ok(())
}

pub async fn remove_label(engine: Arc<MemoryEngine>, cluster_id: i64) -> Result<()> {
    match tokio::task::spawn_blocking(move || engine.remove_label(cluster_id)).await?? {
        Some(old) => println!("Removed label '{old}' from cluster {cluster_id}."),
        None => println!("Cluster {cluster_id} had no label."),
    }
    Ok(())
}

pub async fn show_labels(engine: Arc<MemoryEngine>, cluster_id: Option<i64>) -> Result<()> {
    let labels = tokio::task::spawn_blocking(move || engine.labels()).await??;
    match cluster_id {
        Some(id) => match labels.get(&id) {
            Some(label) => println!("{id}: {label}"),
            None => println!("Cluster {id} has no label."),
        },
        None if labels.is_empty() => println!("No cluster labels set."),
        None => {
            for (id, label) in &labels {
                println!("{id}: {label}");
            }
        }
    }
    Ok(())
}

pub async fn propagate(engine: Arc<MemoryEngine>) -> Result<()> {
    let propagated = tokio::task::spawn_blocking(move || engine.propagate_labels()).await??;
    println!("Propagated labels to {} face(s).", propagated.len());
    for (face_id, label) in &propagated {
        println!("  {face_id} -> {}", label.label);
    }
    Ok(())
}
