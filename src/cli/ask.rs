//! CLI `ask` and `route` commands.

use std::sync::Arc;

use anyhow::Result;

use mnemos::engine::MemoryEngine;
use mnemos::retrieval::Answer;
use mnemos::router::QueryRouter;

use super::preview;

pub async fn ask(engine: Arc<MemoryEngine>, query: String, json: bool) -> Result<()> {
    let response = tokio::task::spawn_blocking(move || engine.ask(&query)).await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("Route: {}", response.route);
    match &response.answer {
        Some(Answer::Found {
            content,
            score,
            evidence,
            ..
        }) => {
            println!("Answer (score {score:.3}):");
            println!("  {}", preview(content, 400));
            if let Some(evidence) = evidence {
                println!(
                    "Evidence: {} [{}] document {}",
                    evidence.filename, evidence.file_type, evidence.document_id
                );
            }
        }
        Some(answer @ Answer::Insufficient) => println!("{}", answer.text()),
        None => {}
    }

    if !response.faces.is_empty() {
        println!("Faces:");
        for face in &response.faces {
            println!(
                "  {} [{}] {}",
                face.id,
                face.label.as_deref().unwrap_or("unlabeled"),
                face.image_path
            );
        }
    } else if response.answer.is_none() {
        println!("No labeled faces match this query.");
    }
    Ok(())
}

/// Print the routing decision without running the query.
pub fn route(query: &str) {
    let decision = QueryRouter::default().classify(query);
    println!("Route: {}", decision.route);
    if decision.keywords.is_empty() {
        println!("No keywords matched (default route).");
    } else {
        println!("Matched: {}", decision.keywords.join(", "));
    }
}
