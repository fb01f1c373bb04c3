//! Personal multimodal memory: similarity-indexed recall, face identity resolution,
//! and query routing.
//!
//! Mnemos stores free-text memories and text extracted from uploaded files, answers
//! natural-language questions from them, and groups the faces it sees into labeled
//! identities. Everything runs locally against a SQLite store and two flat vector
//! indexes kept next to it.
//!
//! | Store | Contents | Metric |
//! |-------|----------|--------|
//! | text index | one 384-d vector per memory | squared L2 |
//! | face index | one 512-d unit vector per face | inner product |
//! | SQLite | memories, documents, faces, cluster labels | n/a |
//!
//! # Architecture
//!
//! - **Routing**: [`router::QueryRouter`] sends each query to the text, face, or
//!   OCR pipeline by keyword, or to both when intents conflict
//! - **Retrieval**: [`retrieval::RetrievalPipeline`] recalls candidates from the text
//!   index, reranks by cosine similarity, and refuses to answer below a confidence gate
//! - **Faces**: [`faces::FaceIdentityEngine`] matches each new face online, clusters
//!   the population with DBSCAN, and [`faces::labels::LabelPropagationManager`] spreads
//!   cluster labels to member faces
//! - **Service**: [`engine::MemoryEngine`] owns all shared state and rebuilds and
//!   persists indexes inline on every write
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite database initialization, schema, and health checks
//! - [`embedding`]: Text and face embedding collaborators
//! - [`engine`]: The service object tying every component together
//! - [`error`]: Typed index and label errors
//! - [`faces`]: Face matching, clustering, and label propagation
//! - [`index`]: Exact vector search and its on-disk format
//! - [`memory`]: Record types and relational store operations
//! - [`retrieval`]: Recall, rerank, and confidence gating
//! - [`router`]: Keyword query routing

pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod faces;
pub mod index;
pub mod memory;
pub mod retrieval;
pub mod router;
