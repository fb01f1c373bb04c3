//! Local text embeddings: all-MiniLM-L6-v2 on ONNX Runtime.
//!
//! Expects `model.onnx` and `tokenizer.json` in the configured cache directory.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer};

use super::{l2_normalize, EmbeddingProvider, EMBEDDING_DIM};
use crate::config::EmbeddingConfig;

/// The model was trained with sequences of at most 256 tokens.
const MAX_SEQ_LEN: usize = 256;

pub struct LocalEmbeddingProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

// Safety: Tokenizer is Send + Sync and the session is only reached through the Mutex.
unsafe impl Send for LocalEmbeddingProvider {}
unsafe impl Sync for LocalEmbeddingProvider {}

/// Padded token batch, flattened row-major as `[batch, seq_len]`.
struct TokenBatch {
    batch_size: usize,
    seq_len: usize,
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
}

impl TokenBatch {
    fn from_encodings(encodings: &[Encoding]) -> Self {
        let batch_size = encodings.len();
        let seq_len = encodings.first().map_or(0, |e| e.get_ids().len());
        let mut input_ids = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
        for encoding in encodings {
            input_ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }
        Self {
            batch_size,
            seq_len,
            input_ids,
            attention_mask,
        }
    }

    fn shape(&self) -> Vec<i64> {
        vec![self.batch_size as i64, self.seq_len as i64]
    }
}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_path, tokenizer_path) = model_files(config);
        anyhow::ensure!(
            model_path.exists(),
            "ONNX model not found at {}; place all-MiniLM-L6-v2 model.onnx there",
            model_path.display()
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer not found at {}",
            tokenizer_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        tracing::info!(model = %model_path.display(), "text embedding model loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }
}

fn model_files(config: &EmbeddingConfig) -> (PathBuf, PathBuf) {
    let dir = crate::config::expand_tilde(&config.cache_dir);
    (dir.join("model.onnx"), dir.join("tokenizer.json"))
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .context("embedding batch returned no rows")
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;
        let batch = TokenBatch::from_encodings(&encodings);

        let input_ids = Tensor::from_array((batch.shape(), batch.input_ids.clone().into_boxed_slice()))?;
        let attention_mask =
            Tensor::from_array((batch.shape(), batch.attention_mask.clone().into_boxed_slice()))?;
        let token_type_ids = Tensor::from_array((
            batch.shape(),
            vec![0i64; batch.batch_size * batch.seq_len].into_boxed_slice(),
        ))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
            "token_type_ids" => token_type_ids,
        })?;

        // Output name differs between exports.
        let hidden = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);
        let (shape, data) = hidden
            .try_extract_tensor::<f32>()
            .context("failed to extract token embeddings")?;

        let dims: &[i64] = &shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] == EMBEDDING_DIM as i64,
            "unexpected token embedding shape {dims:?}, expected [batch, seq, {EMBEDDING_DIM}]"
        );

        let out_seq_len = dims[1] as usize;
        (0..batch.batch_size)
            .map(|b| {
                let mask = &batch.attention_mask[b * batch.seq_len..(b + 1) * batch.seq_len];
                let rows = &data[b * out_seq_len * EMBEDDING_DIM..(b + 1) * out_seq_len * EMBEDDING_DIM];
                let pooled = mean_pool(rows, mask, EMBEDDING_DIM);
                l2_normalize(&pooled).context("model produced a zero vector")
            })
            .collect()
    }
}

/// Average the token rows whose attention mask is set.
fn mean_pool(rows: &[f32], mask: &[i64], hidden: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;
    for (row, &m) in rows.chunks_exact(hidden).zip(mask) {
        if m > 0 {
            for (acc, x) in sum.iter_mut().zip(row) {
                *acc += x;
            }
            count += 1.0;
        }
    }
    if count > 0.0 {
        for acc in &mut sum {
            *acc /= count;
        }
    }
    sum
}
