//! [`MemoryEngine`]: the service object that owns every piece of shared state.
//!
//! Created once at startup and passed by reference into whatever handles a
//! request. Each operation runs to completion before returning, and any index
//! change is rebuilt and persisted inline, so a write is visible to the very
//! next read.
//!
//! Locks are always taken in the order `db → text_index → face_index → labels`.
//! An index is mutated and persisted while its lock is held, which makes every
//! writer exclusive.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::MnemosConfig;
use crate::db;
use crate::embedding::{EmbeddingProvider, FaceDetector, FaceEmbedder, FACE_EMBEDDING_DIM};
use crate::faces::labels::{LabelPropagationManager, PropagatedLabel};
use crate::faces::{FaceHit, FaceIdentityEngine, FaceMatch};
use crate::index::{IdIndex, IndexFiles, Metric};
use crate::memory::types::FaceRecord;
use crate::memory::{clean_text, store};
use crate::retrieval::{Answer, RetrievalPipeline};
use crate::router::{QueryRouter, Route};

/// Result of [`MemoryEngine::ingest_document`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentIngest {
    pub document_id: i64,
    /// `None` when the extracted text was empty after cleaning.
    pub memory_id: Option<i64>,
}

/// Result of [`MemoryEngine::ask`].
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub route: Route,
    pub keywords: Vec<&'static str>,
    /// Present for text, OCR, and hybrid routes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<Answer>,
    /// Faces whose label is named in the query. Face and hybrid routes only.
    pub faces: Vec<FaceRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub memories: i64,
    pub text_vectors: usize,
    pub faces: i64,
    pub face_vectors: usize,
    pub labeled_clusters: usize,
}

pub struct MemoryEngine {
    db: Mutex<Connection>,
    text_index: Mutex<IdIndex<i64>>,
    face_index: Mutex<IdIndex<String>>,
    labels: Mutex<LabelPropagationManager>,
    embedder: Arc<dyn EmbeddingProvider>,
    text_files: Option<IndexFiles>,
    face_files: Option<IndexFiles>,
    model: String,
    router: QueryRouter,
    retrieval: RetrievalPipeline,
    faces: FaceIdentityEngine,
}

/// Write `index` to `files`, or do nothing for an engine that never touches disk.
fn persist_to<Id>(index: &IdIndex<Id>, files: Option<&IndexFiles>) -> Result<()>
where
    Id: Clone + Serialize + DeserializeOwned,
{
    if let Some(files) = files {
        index.persist(files)?;
    }
    Ok(())
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|e| anyhow::anyhow!("{what} lock poisoned: {e}"))
}

impl MemoryEngine {
    /// Open the database and both indexes under the configured data directory.
    ///
    /// Missing index files are a cold start. If the text index does not cover the
    /// stored memories (cold start, or built by another model) it is rebuilt.
    pub fn open(config: &MnemosConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let data_dir = config.resolved_data_dir();
        let conn = db::open_database(config.resolved_db_path())?;

        let text_files = IndexFiles::in_dir(&data_dir, "text");
        let face_files = IndexFiles::in_dir(&data_dir, "faces");
        let text_index = IdIndex::load(&text_files, embedder.dimensions(), Metric::L2)
            .context("failed to load text index")?;
        let face_index = IdIndex::load(&face_files, FACE_EMBEDDING_DIM, Metric::InnerProduct)
            .context("failed to load face index")?;
        let labels = LabelPropagationManager::load(&conn)?;

        let stored_model = db::schema::get_embedding_model(&conn)?;
        let stale = match &stored_model {
            Some(stored) if stored != &config.embedding.model => {
                warn!(
                    stored = %stored,
                    configured = %config.embedding.model,
                    "embedding model changed, text index will be rebuilt"
                );
                true
            }
            _ => {
                // Memories that failed to embed count as covered so they do not
                // force a rebuild on every open.
                let mut covered: BTreeSet<i64> = text_index.ids().iter().copied().collect();
                covered.extend(store::unindexed_memories(&conn)?);
                let stale = covered != store::memory_ids(&conn)?;
                if stale {
                    info!(indexed = text_index.len(), "text index does not match stored memories, rebuilding");
                }
                stale
            }
        };

        let engine = Self::assemble(
            config,
            conn,
            text_index,
            face_index,
            labels,
            embedder,
            Some(text_files),
            Some(face_files),
        );
        if stale {
            engine.rebuild_text_index(|_, _| {})?;
        }
        Ok(engine)
    }

    /// An engine over an in-memory database that never touches disk.
    pub fn in_memory(config: &MnemosConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let conn = db::open_memory_database()?;
        let text_index = IdIndex::new(embedder.dimensions(), Metric::L2);
        let face_index = IdIndex::new(FACE_EMBEDDING_DIM, Metric::InnerProduct);
        Ok(Self::assemble(
            config,
            conn,
            text_index,
            face_index,
            LabelPropagationManager::new(),
            embedder,
            None,
            None,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        config: &MnemosConfig,
        conn: Connection,
        text_index: IdIndex<i64>,
        face_index: IdIndex<String>,
        labels: LabelPropagationManager,
        embedder: Arc<dyn EmbeddingProvider>,
        text_files: Option<IndexFiles>,
        face_files: Option<IndexFiles>,
    ) -> Self {
        Self {
            db: Mutex::new(conn),
            text_index: Mutex::new(text_index),
            face_index: Mutex::new(face_index),
            labels: Mutex::new(labels),
            embedder,
            text_files,
            face_files,
            model: config.embedding.model.clone(),
            router: QueryRouter::default(),
            retrieval: RetrievalPipeline::new(&config.retrieval),
            faces: FaceIdentityEngine::new(&config.faces),
        }
    }

    // ── Text memories ─────────────────────────────────────────────────────────

    /// Store a text memory and rebuild the text index before returning.
    ///
    /// The row is committed only once the rebuilt index is on disk. On failure
    /// nothing is stored and the previous index stays in place.
    pub fn remember(&self, content: &str) -> Result<i64> {
        anyhow::ensure!(!content.trim().is_empty(), "content must not be empty");
        let mut conn = lock(&self.db, "db")?;
        let tx = conn.transaction()?;
        let id = store::insert_memory(&tx, content)?;
        self.rebuild_and_commit(tx, &mut |_, _| {})?;
        info!(memory_id = id, content_len = content.len(), "memory stored");
        Ok(id)
    }

    /// Record an uploaded file and, if its extracted text is non-empty after
    /// whitespace cleaning, store that text as a memory linked to the file.
    /// All rows land in one transaction.
    pub fn ingest_document(
        &self,
        filename: &str,
        file_path: &str,
        extracted_text: &str,
    ) -> Result<DocumentIngest> {
        let mut conn = lock(&self.db, "db")?;
        let tx = conn.transaction()?;
        let document_id = store::insert_document(&tx, filename, file_path)?;

        let cleaned = clean_text(extracted_text);
        if cleaned.is_empty() {
            tx.commit()?;
            info!(document_id, filename, "document stored without text");
            return Ok(DocumentIngest {
                document_id,
                memory_id: None,
            });
        }

        let memory_id = store::insert_memory(&tx, &cleaned)?;
        store::link_document_memory(&tx, document_id, memory_id)?;
        self.rebuild_and_commit(tx, &mut |_, _| {})?;
        info!(document_id, memory_id, filename, "document text stored");

        Ok(DocumentIngest {
            document_id,
            memory_id: Some(memory_id),
        })
    }

    /// Drop the text index and re-embed every stored memory.
    ///
    /// `on_progress(done, total)` is called after each record.
    pub fn rebuild_text_index(&self, mut on_progress: impl FnMut(usize, usize)) -> Result<usize> {
        let mut conn = lock(&self.db, "db")?;
        let tx = conn.transaction()?;
        self.rebuild_and_commit(tx, &mut on_progress)
    }

    /// Full rebuild from the store snapshot seen by `tx`, persist, then commit.
    ///
    /// The live index is swapped only after the commit. If persisting or
    /// committing fails, the previous index is written back and `tx` rolls back.
    fn rebuild_and_commit(
        &self,
        tx: Transaction<'_>,
        on_progress: &mut dyn FnMut(usize, usize),
    ) -> Result<usize> {
        let memories = store::all_memories(&tx)?;
        let total = memories.len();

        let mut vectors = Vec::with_capacity(total);
        let mut unindexed = BTreeSet::new();
        for (done, record) in memories.into_iter().enumerate() {
            match self.embedder.embed(&record.content) {
                Ok(v) => vectors.push((record.id, v)),
                Err(e) => {
                    warn!(memory_id = record.id, error = %e, "failed to embed memory, leaving it out of the index");
                    unindexed.insert(record.id);
                }
            }
            on_progress(done + 1, total);
        }

        let mut index = lock(&self.text_index, "text index")?;
        let mut fresh = IdIndex::new(index.dimension(), index.metric());
        let count = fresh.rebuild(vectors)?;

        let outcome = persist_to(&fresh, self.text_files.as_ref()).and_then(|()| {
            db::schema::set_embedding_model(&tx, &self.model)?;
            store::set_unindexed_memories(&tx, &unindexed)?;
            tx.commit()?;
            Ok(())
        });
        if let Err(e) = outcome {
            if let Err(restore) = persist_to(&*index, self.text_files.as_ref()) {
                warn!(error = %restore, "failed to restore previous text index files");
            }
            return Err(e);
        }

        *index = fresh;
        info!(count, total, skipped = unindexed.len(), "text index rebuilt");
        Ok(count)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Route a query and dispatch it to the matching pipeline(s).
    pub fn ask(&self, query: &str) -> Result<QueryResponse> {
        let decision = self.router.classify(query);
        info!(route = %decision.route, "query received");

        let wants_text = matches!(decision.route, Route::Text | Route::Ocr | Route::Hybrid);
        let wants_faces = matches!(decision.route, Route::Face | Route::Hybrid);

        let conn = lock(&self.db, "db")?;
        let answer = if wants_text {
            let query_embedding = self.embedder.embed(query).context("failed to embed query")?;
            let index = lock(&self.text_index, "text index")?;
            Some(
                self.retrieval
                    .answer(&conn, self.embedder.as_ref(), &index, &query_embedding)?,
            )
        } else {
            None
        };
        let faces = if wants_faces {
            store::faces_with_label_in(&conn, query)?
        } else {
            Vec::new()
        };

        debug!(
            found = answer.as_ref().is_some_and(Answer::is_found),
            faces = faces.len(),
            "query answered"
        );
        Ok(QueryResponse {
            query: query.to_string(),
            route: decision.route,
            keywords: decision.keywords,
            answer,
            faces,
        })
    }

    // ── Faces ─────────────────────────────────────────────────────────────────

    /// Detect, match, and index every face in an image, then persist the face index.
    pub fn add_faces(
        &self,
        image: &Path,
        detector: &dyn FaceDetector,
        embedder: &dyn FaceEmbedder,
    ) -> Result<Vec<FaceMatch>> {
        let detected = detector
            .detect(image)
            .with_context(|| format!("face detection failed for {}", image.display()))?;
        if detected.is_empty() {
            info!(image = %image.display(), "no face detected");
            return Ok(Vec::new());
        }

        let mut conn = lock(&self.db, "db")?;
        let tx = conn.transaction()?;
        let mut index = lock(&self.face_index, "face index")?;
        let mut staged = index.clone();
        let added = self
            .faces
            .ingest_faces(&tx, &mut staged, image, &detected, embedder)?;

        let outcome = persist_to(&staged, self.face_files.as_ref()).and_then(|()| {
            tx.commit()?;
            Ok(())
        });
        if let Err(e) = outcome {
            if let Err(restore) = persist_to(&*index, self.face_files.as_ref()) {
                warn!(error = %restore, "failed to restore previous face index files");
            }
            return Err(e);
        }

        *index = staged;
        Ok(added)
    }

    /// Faces most similar to a unit-norm query embedding.
    pub fn search_faces(&self, embedding: &[f32]) -> Result<Vec<FaceHit>> {
        let conn = lock(&self.db, "db")?;
        let index = lock(&self.face_index, "face index")?;
        self.faces.search(&conn, &index, embedding)
    }

    /// Cluster the current face population. Does not modify the index.
    pub fn cluster_faces(&self) -> Result<BTreeMap<String, i64>> {
        let index = lock(&self.face_index, "face index")?;
        Ok(self.faces.cluster(&index))
    }

    // ── Labels ────────────────────────────────────────────────────────────────

    pub fn set_label(&self, cluster_id: i64, label: &str) -> Result<()> {
        self.update_labels(|labels| labels.set_label(cluster_id, label).map_err(Into::into))
    }

    pub fn rename_label(&self, cluster_id: i64, new_label: &str) -> Result<()> {
        self.update_labels(|labels| labels.rename_label(cluster_id, new_label).map_err(Into::into))
    }

    pub fn remove_label(&self, cluster_id: i64) -> Result<Option<String>> {
        self.update_labels(|labels| Ok(labels.remove_label(cluster_id)))
    }

    pub fn get_label(&self, cluster_id: i64) -> Result<Option<String>> {
        let labels = lock(&self.labels, "labels")?;
        Ok(labels.get_label(cluster_id).map(str::to_string))
    }

    pub fn labels(&self) -> Result<BTreeMap<i64, String>> {
        Ok(lock(&self.labels, "labels")?.labels().clone())
    }

    /// Apply a change to a copy of the bindings, save it, and only then adopt it.
    fn update_labels<T>(
        &self,
        change: impl FnOnce(&mut LabelPropagationManager) -> Result<T>,
    ) -> Result<T> {
        let mut conn = lock(&self.db, "db")?;
        let mut labels = lock(&self.labels, "labels")?;
        let mut staged = labels.clone();
        let out = change(&mut staged)?;
        staged.save(&mut conn)?;
        *labels = staged;
        Ok(out)
    }

    /// Re-cluster, propagate cluster labels to member faces, and write them onto
    /// each face's label snapshot. Faces outside labeled clusters keep their snapshot.
    pub fn propagate_labels(&self) -> Result<BTreeMap<String, PropagatedLabel>> {
        let mut conn = lock(&self.db, "db")?;
        let tx = conn.transaction()?;
        let clusters = {
            let index = lock(&self.face_index, "face index")?;
            self.faces.cluster(&index)
        };
        let propagated = lock(&self.labels, "labels")?.propagate(&clusters);

        for (face_id, label) in &propagated {
            if !store::update_face_label(&tx, face_id, Some(label.label.as_str()))? {
                warn!(face_id = %face_id, "indexed face missing from store");
            }
        }
        tx.commit()?;
        info!(faces = propagated.len(), "labels propagated");
        Ok(propagated)
    }

    pub fn stats(&self) -> Result<EngineStats> {
        let conn = lock(&self.db, "db")?;
        let text_vectors = lock(&self.text_index, "text index")?.len();
        let face_vectors = lock(&self.face_index, "face index")?.len();
        let labeled_clusters = lock(&self.labels, "labels")?.labels().len();
        Ok(EngineStats {
            memories: store::memory_count(&conn)?,
            text_vectors,
            faces: store::face_count(&conn)?,
            face_vectors,
            labeled_clusters,
        })
    }
}
