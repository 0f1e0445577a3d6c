//! Reciprocal Rank Fusion (spec §4.E.2 step 5, §GLOSSARY).

use std::collections::HashMap;

use serde::Serialize;

use crate::store::ChunkMetadata;

#[derive(Debug, Clone, Serialize)]
pub struct DenseRanked {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub cosine_similarity: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Bm25Ranked {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub bm25_score: f32,
    pub top_matching_words: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FusedResult {
    pub document_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub cosine_similarity: f32,
    pub bm25_score: f32,
    pub rrf_score: f32,
    pub top_matching_words: Vec<String>,
    pub vector_rank: Option<usize>,
    pub bm25_rank: Option<usize>,
}

/// Merges a dense-ranked list and a BM25-ranked list by Reciprocal Rank
/// Fusion. Each list contributes `1 / (k + rank)` (1-based rank) to a
/// chunk's total score; per-result fields are filled from whichever list
/// (or both) produced the chunk, with the zero/empty default spec §4.E.2
/// step 5 specifies for the list that didn't. Insertion order (first seen
/// wins ties) matches spec §4.E.3's stable-order tie-break.
pub fn reciprocal_rank_fusion(dense: &[DenseRanked], bm25: &[Bm25Ranked], k: usize) -> Vec<FusedResult> {
    let mut order: Vec<String> = Vec::new();
    let mut entries: HashMap<String, FusedResult> = HashMap::new();

    for (i, hit) in dense.iter().enumerate() {
        let rank = i + 1;
        let entry = entries.entry(hit.chunk_id.clone()).or_insert_with(|| {
            order.push(hit.chunk_id.clone());
            FusedResult {
                document_id: hit.chunk_id.clone(),
                text: hit.text.clone(),
                metadata: hit.metadata.clone(),
                cosine_similarity: 0.0,
                bm25_score: 0.0,
                rrf_score: 0.0,
                top_matching_words: Vec::new(),
                vector_rank: None,
                bm25_rank: None,
            }
        });
        entry.cosine_similarity = hit.cosine_similarity;
        entry.vector_rank = Some(rank);
        entry.rrf_score += 1.0 / (k + rank) as f32;
    }

    for (i, hit) in bm25.iter().enumerate() {
        let rank = i + 1;
        let entry = entries.entry(hit.chunk_id.clone()).or_insert_with(|| {
            order.push(hit.chunk_id.clone());
            FusedResult {
                document_id: hit.chunk_id.clone(),
                text: hit.text.clone(),
                metadata: hit.metadata.clone(),
                cosine_similarity: 0.0,
                bm25_score: 0.0,
                rrf_score: 0.0,
                top_matching_words: Vec::new(),
                vector_rank: None,
                bm25_rank: None,
            }
        });
        entry.bm25_score = hit.bm25_score;
        entry.top_matching_words = hit.top_matching_words.clone();
        entry.bm25_rank = Some(rank);
        entry.rrf_score += 1.0 / (k + rank) as f32;
    }

    let mut fused: Vec<FusedResult> = order.into_iter().map(|id| entries.remove(&id).unwrap()).collect();
    fused.sort_by(|a, b| b.rrf_score.partial_cmp(&a.rrf_score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}
