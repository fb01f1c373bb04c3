//! Two-stage text retrieval with a hard confidence gate.
//!
//! 1. **Recall**: the text index yields up to `top_k` candidate memory ids.
//! 2. **Rerank**: each candidate's content is re-embedded and scored by cosine
//!    similarity against the query. Re-embedding means a stale or since-rebuilt
//!    index can only cost recall, never produce a wrong score.
//!
//! The best candidate wins; ties go to the one recalled first. If nothing was
//! recalled, or the best score is below the threshold, the answer is
//! [`Answer::Insufficient`] rather than a low-confidence guess.

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::index::IdIndex;
use crate::memory::store;
use crate::memory::types::FileType;

/// What the assistant says when the gate rejects every candidate.
pub const INSUFFICIENT_INFORMATION: &str = "I don't have enough information to answer this yet.";

/// Provenance for an answer extracted from an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    pub document_id: i64,
    pub filename: String,
    pub file_type: FileType,
    /// The memory text the answer came from.
    pub chunk: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Answer {
    Found {
        memory_id: i64,
        content: String,
        score: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        evidence: Option<Evidence>,
    },
    Insufficient,
}

impl Answer {
    /// Text shown to the user.
    pub fn text(&self) -> &str {
        match self {
            Self::Found { content, .. } => content,
            Self::Insufficient => INSUFFICIENT_INFORMATION,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalPipeline {
    top_k: usize,
    confidence_threshold: f32,
}

impl Default for RetrievalPipeline {
    fn default() -> Self {
        Self::new(&RetrievalConfig::default())
    }
}

impl RetrievalPipeline {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            confidence_threshold: config.confidence_threshold,
        }
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Recall, rerank, gate, and attach evidence for one query embedding.
    pub fn answer(
        &self,
        conn: &Connection,
        embedder: &dyn EmbeddingProvider,
        index: &IdIndex<i64>,
        query_embedding: &[f32],
    ) -> Result<Answer> {
        let candidates = index
            .search(query_embedding, self.top_k)
            .context("text index recall failed")?;
        debug!(candidates = candidates.len(), "recall complete");

        let mut best: Option<(i64, String, f32)> = None;
        for candidate in candidates {
            let record = match store::get_memory(conn, candidate.id) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    warn!(memory_id = candidate.id, "indexed memory missing from store, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(memory_id = candidate.id, error = %e, "failed to read memory, skipping");
                    continue;
                }
            };

            let embedding = match embedder.embed(&record.content) {
                Ok(v) => v,
                Err(e) => {
                    warn!(memory_id = record.id, error = %e, "failed to embed candidate, skipping");
                    continue;
                }
            };

            let score = cosine_similarity(query_embedding, &embedding);
            debug!(memory_id = record.id, score, "reranked candidate");
            if best.as_ref().map_or(true, |(_, _, top)| score > *top) {
                best = Some((record.id, record.content, score));
            }
        }

        let Some((memory_id, content, score)) = best else {
            debug!("no candidates survived rerank");
            return Ok(Answer::Insufficient);
        };
        // NaN must not pass the gate
        if !(score >= self.confidence_threshold) {
            debug!(score, threshold = self.confidence_threshold, "best score below threshold");
            return Ok(Answer::Insufficient);
        }

        let evidence = store::document_for_memory(conn, memory_id)?.map(|doc| Evidence {
            document_id: doc.id,
            file_type: FileType::from_filename(&doc.filename),
            filename: doc.filename,
            chunk: content.clone(),
        });

        Ok(Answer::Found {
            memory_id,
            content,
            score,
            evidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::index::Metric;

    /// Maps known strings to fixed 2-d vectors; anything else fails to embed.
    struct TableEmbedder(Vec<(&'static str, Vec<f32>)>);

    impl EmbeddingProvider for TableEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.0
                .iter()
                .find(|(t, _)| *t == text)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| anyhow::anyhow!("unknown text {text}"))
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn index_of(conn: &Connection, embedder: &TableEmbedder) -> IdIndex<i64> {
        let mut index = IdIndex::new(2, Metric::L2);
        for record in store::all_memories(conn).unwrap() {
            if let Ok(v) = embedder.embed(&record.content) {
                index.add(record.id, &v).unwrap();
            }
        }
        index
    }

    #[test]
    fn empty_index_is_insufficient() {
        let conn = open_memory_database().unwrap();
        let embedder = TableEmbedder(vec![]);
        let index = IdIndex::new(2, Metric::L2);
        let answer = RetrievalPipeline::default()
            .answer(&conn, &embedder, &index, &[1.0, 0.0])
            .unwrap();
        assert_eq!(answer, Answer::Insufficient);
        assert_eq!(answer.text(), INSUFFICIENT_INFORMATION);
    }

    #[test]
    fn picks_highest_cosine_and_attaches_evidence() {
        let conn = open_memory_database().unwrap();
        let embedder = TableEmbedder(vec![
            ("round robin scheduling", vec![1.0, 0.1]),
            ("binary trees", vec![0.0, 1.0]),
        ]);
        let sched = store::insert_memory(&conn, "round robin scheduling").unwrap();
        store::insert_memory(&conn, "binary trees").unwrap();
        let doc = store::insert_document(&conn, "os_notes.pdf", "/u/os_notes.pdf").unwrap();
        store::link_document_memory(&conn, doc, sched).unwrap();

        let index = index_of(&conn, &embedder);
        let answer = RetrievalPipeline::default()
            .answer(&conn, &embedder, &index, &[1.0, 0.0])
            .unwrap();

        match answer {
            Answer::Found {
                memory_id,
                evidence,
                score,
                ..
            } => {
                assert_eq!(memory_id, sched);
                assert!(score > 0.9);
                let evidence = evidence.unwrap();
                assert_eq!(evidence.document_id, doc);
                assert_eq!(evidence.file_type, FileType::Pdf);
                assert_eq!(evidence.chunk, "round robin scheduling");
            }
            Answer::Insufficient => panic!("expected a match"),
        }
    }

    #[test]
    fn below_threshold_is_insufficient() {
        let conn = open_memory_database().unwrap();
        let embedder = TableEmbedder(vec![("unrelated", vec![0.0, 1.0])]);
        store::insert_memory(&conn, "unrelated").unwrap();
        let index = index_of(&conn, &embedder);

        // cosine([1, 0.2], [0, 1]) ≈ 0.196
        let answer = RetrievalPipeline::default()
            .answer(&conn, &embedder, &index, &[1.0, 0.2])
            .unwrap();
        assert_eq!(answer, Answer::Insufficient);
    }

    #[test]
    fn score_equal_to_threshold_passes_gate() {
        let conn = open_memory_database().unwrap();
        let embedder = TableEmbedder(vec![("three four", vec![3.0, 4.0])]);
        let id = store::insert_memory(&conn, "three four").unwrap();
        let index = index_of(&conn, &embedder);

        // cosine([1, 0], [3, 4]) is exactly 3 / 5
        let pipeline = RetrievalPipeline::new(&RetrievalConfig {
            top_k: 5,
            confidence_threshold: 0.6,
        });
        let answer = pipeline.answer(&conn, &embedder, &index, &[1.0, 0.0]).unwrap();
        assert!(matches!(answer, Answer::Found { memory_id, score, .. } if memory_id == id && score == 0.6));

        let stricter = RetrievalPipeline::new(&RetrievalConfig {
            top_k: 5,
            confidence_threshold: 0.6000001,
        });
        let answer = stricter.answer(&conn, &embedder, &index, &[1.0, 0.0]).unwrap();
        assert_eq!(answer, Answer::Insufficient);
    }

    #[test]
    fn ties_go_to_first_recalled() {
        let conn = open_memory_database().unwrap();
        let embedder = TableEmbedder(vec![("a", vec![1.0, 0.0]), ("b", vec![2.0, 0.0])]);
        let a = store::insert_memory(&conn, "a").unwrap();
        store::insert_memory(&conn, "b").unwrap();
        let index = index_of(&conn, &embedder);

        // L2 recall puts "a" first; both rerank to cosine 1.0
        let answer = RetrievalPipeline::default()
            .answer(&conn, &embedder, &index, &[1.0, 0.0])
            .unwrap();
        assert!(matches!(answer, Answer::Found { memory_id, .. } if memory_id == a));
    }

    #[test]
    fn unembeddable_candidate_is_skipped() {
        let conn = open_memory_database().unwrap();
        let good = TableEmbedder(vec![("kept", vec![0.9, 0.1]), ("broken", vec![1.0, 0.0])]);
        let kept = store::insert_memory(&conn, "kept").unwrap();
        store::insert_memory(&conn, "broken").unwrap();
        let index = index_of(&conn, &good);

        // at query time "broken" no longer embeds
        let rerank = TableEmbedder(vec![("kept", vec![0.9, 0.1])]);
        let answer = RetrievalPipeline::default()
            .answer(&conn, &rerank, &index, &[1.0, 0.0])
            .unwrap();
        match answer {
            Answer::Found {
                memory_id, evidence, ..
            } => {
                assert_eq!(memory_id, kept);
                assert!(evidence.is_none());
            }
            Answer::Insufficient => panic!("expected the surviving candidate"),
        }
    }
}
