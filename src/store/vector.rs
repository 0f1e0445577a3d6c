//! Brute-force cosine vector collection — the authoritative per-figure
//! chunk store (spec §3 "Figure vector collection", §4.D).
//!
//! No ANN index crate in the ecosystem corpus covers this without pulling
//! in an external vector database service (chromadb, qdrant); the spec's
//! Non-goals explicitly exclude approximate nearest-neighbor search beyond
//! what the store itself supplies, so an exact linear scan is the grounded
//! choice here — simple, correct, and proportionate to a single figure's
//! corpus size. See DESIGN.md.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::embedding::cosine_similarity;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub filename: String,
    pub original_filename: String,
    pub file_type: String,
    pub file_size: u64,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub char_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
    /// Unigrams + filtered bigrams (spec §3 invariant 1). Empty is allowed
    /// ("degraded BM25", spec §9 open question c) but logged by the caller.
    pub processed_tokens: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DenseHit {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub similarity: f32,
}

/// One figure's dense index, persisted as a single JSON document. Chroma
/// is opaque storage in the original system (spec §6); a flat JSON file
/// per figure is the equivalent here — one artifact, one figure, one
/// source of truth.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VectorCollection {
    chunks: Vec<StoredChunk>,
}

impl VectorCollection {
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path)
            .map_err(|e| CoreError::index(format!("failed to read vector collection: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::index(format!("failed to parse vector collection: {e}")))
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::index(format!("failed to create vector store dir: {e}")))?;
        }
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| CoreError::index(format!("failed to serialize vector collection: {e}")))?;
        std::fs::write(path, bytes)
            .map_err(|e| CoreError::index(format!("failed to write vector collection: {e}")))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn add_chunk(&mut self, chunk: StoredChunk) {
        self.chunks.push(chunk);
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    pub fn chunks(&self) -> &[StoredChunk] {
        &self.chunks
    }

    pub fn get_text(&self, chunk_id: &str) -> Option<&str> {
        self.chunks.iter().find(|c| c.chunk_id == chunk_id).map(|c| c.text.as_str())
    }

    /// Linear cosine scan against every stored vector (spec §4.D
    /// `query_dense`): converts distance to `similarity = 1 - d`, which
    /// for a cosine-space index over non-negative similarities collapses
    /// to returning the similarity directly.
    pub fn query_dense(&self, query_vector: &[f32], n: usize) -> Vec<DenseHit> {
        let mut scored: Vec<DenseHit> = self
            .chunks
            .iter()
            .map(|c| DenseHit {
                chunk_id: c.chunk_id.clone(),
                text: c.text.clone(),
                metadata: c.metadata.clone(),
                similarity: cosine_similarity(query_vector, &c.vector),
            })
            .collect();

        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n);
        scored
    }
}

pub fn collection_path(vector_store_dir: &Path, figure_id: &str) -> PathBuf {
    vector_store_dir.join(format!("{figure_id}.json"))
}
