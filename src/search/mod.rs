//! Hybrid Search Engine (spec §4.E) — a disk-cached BM25 index lazily
//! derived from the figure store, fused with dense search via Reciprocal
//! Rank Fusion.

pub mod bm25;
pub mod rrf;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;
use crate::error::CoreResult;
use crate::store::{ChunkMetadata, FigureStore};
use crate::text::TextProcessor;
use bm25::Bm25Index;
pub use rrf::FusedResult;
use rrf::{reciprocal_rank_fusion, Bm25Ranked, DenseRanked};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkRef {
    chunk_id: String,
    text: String,
    metadata: ChunkMetadata,
}

/// `(bm25, token_lists, metadatas)` held per figure (spec §4.E.1) — the
/// three persisted artifacts, loaded together or rebuilt together.
struct Bm25State {
    index: Bm25Index,
    token_lists: Vec<Vec<String>>,
    refs: Vec<ChunkRef>,
}

struct Bm25Paths {
    index: PathBuf,
    docs: PathBuf,
    meta: PathBuf,
}

fn paths_for(bm25_dir: &Path, figure_id: &str) -> Bm25Paths {
    Bm25Paths {
        index: bm25_dir.join(format!("{figure_id}.index.bin")),
        docs: bm25_dir.join(format!("{figure_id}.docs.bin")),
        meta: bm25_dir.join(format!("{figure_id}.meta.bin")),
    }
}

pub struct HybridSearchEngine {
    bm25_dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Bm25State>>>,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    rebuild_counts: RwLock<HashMap<String, usize>>,
    pub rrf_k: usize,
    pub search_multiplier: usize,
    pub max_search_results: usize,
    pub default_min_cosine_similarity: f32,
}

impl HybridSearchEngine {
    pub fn new(
        bm25_dir: PathBuf,
        rrf_k: usize,
        search_multiplier: usize,
        max_search_results: usize,
        default_min_cosine_similarity: f32,
    ) -> Self {
        Self {
            bm25_dir,
            cache: RwLock::new(HashMap::new()),
            locks: RwLock::new(HashMap::new()),
            rebuild_counts: RwLock::new(HashMap::new()),
            rrf_k,
            search_multiplier,
            max_search_results,
            default_min_cosine_similarity,
        }
    }

    /// Number of times `figure_id`'s BM25 index has been rebuilt from the
    /// store this process (spec §8 scenario 5: concurrent rebuild must
    /// happen exactly once, observably).
    pub fn rebuild_count(&self, figure_id: &str) -> usize {
        *self.rebuild_counts.read().get(figure_id).unwrap_or(&0)
    }

    fn figure_lock(&self, figure_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().get(figure_id) {
            return lock.clone();
        }
        self.locks.write().entry(figure_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Ensures a BM25 index is cached for `figure_id`, loading from disk
    /// or rebuilding from the vector collection as needed (spec §4.E.1
    /// `Preload`). Concurrent callers for the same figure serialize on a
    /// per-figure lock so a lazy rebuild happens at most once (spec §5).
    /// Returns `None` if the figure truly has no indexable tokens yet.
    fn ensure_bm25(&self, figure_id: &str, store: &FigureStore) -> CoreResult<Option<Arc<Bm25State>>> {
        if let Some(state) = self.cache.read().get(figure_id) {
            return Ok(Some(state.clone()));
        }

        let lock = self.figure_lock(figure_id);
        let _guard = lock.lock();

        if let Some(state) = self.cache.read().get(figure_id) {
            return Ok(Some(state.clone()));
        }

        if let Some(state) = self.load_from_disk(figure_id) {
            let state = Arc::new(state);
            self.cache.write().insert(figure_id.to_string(), state.clone());
            return Ok(Some(state));
        }

        *self.rebuild_counts.write().entry(figure_id.to_string()).or_insert(0) += 1;

        let state = self.rebuild_from_store(figure_id, store)?;
        match state {
            Some(state) => {
                let state = Arc::new(state);
                self.persist(figure_id, &state);
                self.cache.write().insert(figure_id.to_string(), state.clone());
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    fn load_from_disk(&self, figure_id: &str) -> Option<Bm25State> {
        let paths = paths_for(&self.bm25_dir, figure_id);
        if !paths.index.exists() || !paths.docs.exists() || !paths.meta.exists() {
            return None;
        }
        let index: Bm25Index = bincode::deserialize(&std::fs::read(&paths.index).ok()?).ok()?;
        let token_lists: Vec<Vec<String>> = bincode::deserialize(&std::fs::read(&paths.docs).ok()?).ok()?;
        let refs: Vec<ChunkRef> = bincode::deserialize(&std::fs::read(&paths.meta).ok()?).ok()?;
        Some(Bm25State { index, token_lists, refs })
    }

    /// Disk writes are best-effort (spec §5): a failure is logged, never
    /// propagated, since the index still works from the in-memory cache.
    fn persist(&self, figure_id: &str, state: &Bm25State) {
        let paths = paths_for(&self.bm25_dir, figure_id);
        if let Err(e) = std::fs::create_dir_all(&self.bm25_dir) {
            tracing::warn!(figure = figure_id, error = %e, "failed to create bm25 directory");
            return;
        }
        let write = |path: &Path, bytes: CoreResult<Vec<u8>>| match bytes {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(path, bytes) {
                    tracing::warn!(figure = figure_id, path = %path.display(), error = %e, "failed to persist bm25 artifact");
                }
            }
            Err(e) => tracing::warn!(figure = figure_id, error = %e, "failed to serialize bm25 artifact"),
        };

        write(&paths.index, bincode::serialize(&state.index).map_err(|e| crate::error::CoreError::index(e.to_string())));
        write(&paths.docs, bincode::serialize(&state.token_lists).map_err(|e| crate::error::CoreError::index(e.to_string())));
        write(&paths.meta, bincode::serialize(&state.refs).map_err(|e| crate::error::CoreError::index(e.to_string())));
    }

    fn rebuild_from_store(&self, figure_id: &str, store: &FigureStore) -> CoreResult<Option<Bm25State>> {
        let (token_lists, refs) = store.with_chunks(figure_id, |chunks| {
            let token_lists: Vec<Vec<String>> = chunks.iter().map(|c| c.processed_tokens.clone()).collect();
            let refs: Vec<ChunkRef> = chunks
                .iter()
                .map(|c| ChunkRef { chunk_id: c.chunk_id.clone(), text: c.text.clone(), metadata: c.metadata.clone() })
                .collect();
            (token_lists, refs)
        })?;

        if token_lists.iter().all(|t| t.is_empty()) {
            return Ok(None);
        }

        let index = Bm25Index::build(&token_lists);
        Ok(Some(Bm25State { index, token_lists, refs }))
    }

    /// Drops the cached index and deletes its persisted artifacts (spec
    /// §4.E.1 `Invalidate`). Called once per ingestion batch / clear /
    /// delete, not per chunk (spec §5 ordering guarantees).
    pub fn invalidate(&self, figure_id: &str) {
        self.cache.write().remove(figure_id);
        let paths = paths_for(&self.bm25_dir, figure_id);
        for path in [&paths.index, &paths.docs, &paths.meta] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(figure = figure_id, path = %path.display(), error = %e, "failed to remove bm25 artifact");
                }
            }
        }
    }

    /// Runs the full hybrid query pipeline (spec §4.E.2): ensure BM25,
    /// dense search with threshold filter, BM25 search with
    /// top-matching-words, RRF fuse, re-filter, truncate.
    #[allow(clippy::too_many_arguments)]
    pub fn search(
        &self,
        figure_id: &str,
        query: &str,
        n_results: usize,
        min_cosine_similarity: Option<f32>,
        store: &FigureStore,
        embedder: &dyn EmbeddingProvider,
        text_processor: &TextProcessor,
    ) -> CoreResult<Vec<FusedResult>> {
        let threshold = min_cosine_similarity.unwrap_or(self.default_min_cosine_similarity);
        let extended_n = (n_results * self.search_multiplier).min(self.max_search_results);

        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let bm25_state = self.ensure_bm25(figure_id, store)?;

        let query_vector = embedder.encode_query(query)?;
        let dense_hits = store.query_dense(figure_id, &query_vector, extended_n)?;
        let dense_ranked: Vec<DenseRanked> = dense_hits
            .into_iter()
            .filter(|h| h.similarity >= threshold)
            .map(|h| DenseRanked { chunk_id: h.chunk_id, text: h.text, metadata: h.metadata, cosine_similarity: h.similarity })
            .collect();

        if dense_ranked.is_empty() {
            return Ok(Vec::new());
        }

        let bm25_ranked = match &bm25_state {
            Some(state) => self.bm25_search(state, query, extended_n, text_processor),
            None => Vec::new(),
        };

        let fused = reciprocal_rank_fusion(&dense_ranked, &bm25_ranked, self.rrf_k);

        let mut filtered: Vec<FusedResult> =
            fused.into_iter().filter(|r| r.cosine_similarity >= threshold).collect();
        filtered.truncate(n_results);
        Ok(filtered)
    }

    fn bm25_search(&self, state: &Bm25State, query: &str, n: usize, text_processor: &TextProcessor) -> Vec<Bm25Ranked> {
        let query_tokens = text_processor.process_query(query, (1, 2));
        if query_tokens.is_empty() || state.index.is_empty() {
            return Vec::new();
        }

        let scores = state.index.scores(&query_tokens);
        let mut indexed: Vec<(usize, f32)> =
            scores.into_iter().enumerate().filter(|(_, score)| *score > 0.0).collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        indexed.truncate(n);

        indexed
            .into_iter()
            .map(|(doc_index, score)| {
                let top_matching_words = self.top_matching_words(state, &query_tokens, doc_index, text_processor);
                let chunk_ref = &state.refs[doc_index];
                Bm25Ranked {
                    chunk_id: chunk_ref.chunk_id.clone(),
                    text: chunk_ref.text.clone(),
                    metadata: chunk_ref.metadata.clone(),
                    bm25_score: score,
                    top_matching_words,
                }
            })
            .collect()
    }

    /// Per-term BM25 contribution, sorted descending, excluding any term
    /// (or bigram with a stopword component), top 5, `_` rendered as a
    /// space for display (spec §4.E.2 step 4).
    fn top_matching_words(
        &self,
        state: &Bm25State,
        query_tokens: &[String],
        doc_index: usize,
        text_processor: &TextProcessor,
    ) -> Vec<String> {
        let mut contributions = state.index.term_contributions(query_tokens, doc_index);
        contributions.retain(|(term, score)| {
            *score > 0.0
                && !term
                    .split('_')
                    .any(|component| text_processor.is_stopword(component))
        });
        contributions.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        contributions.into_iter().take(5).map(|(term, _)| term.replace('_', " ")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChunkMetadata, StoredChunk};
    use tempfile::tempdir;

    struct FakeEmbedder;
    impl EmbeddingProvider for FakeEmbedder {
        fn encode_document(&self, text: &str) -> CoreResult<Vec<f32>> {
            Ok(fake_vector(text))
        }
        fn encode_query(&self, text: &str) -> CoreResult<Vec<f32>> {
            Ok(fake_vector(text))
        }
    }

    fn fake_vector(text: &str) -> Vec<f32> {
        let has_napoleon = text.to_lowercase().contains("napoleon") as i32 as f32;
        let has_cat = text.to_lowercase().contains("cat") as i32 as f32;
        let mut v = vec![has_napoleon, has_cat];
        crate::embedding::l2_normalize(&mut v);
        if v.iter().all(|x| *x == 0.0) {
            v = vec![0.1, 0.1];
        }
        v
    }

    fn meta() -> ChunkMetadata {
        ChunkMetadata {
            filename: "f.txt".into(),
            original_filename: "f.txt".into(),
            file_type: "txt".into(),
            file_size: 1,
            chunk_index: 0,
            total_chunks: 1,
            start_char: 0,
            end_char: 1,
            char_count: 1,
        }
    }

    fn setup() -> (tempfile::TempDir, FigureStore, HybridSearchEngine, TextProcessor) {
        let dir = tempdir().unwrap();
        let store = FigureStore::new(dir.path().join("figures"), dir.path().join("chroma_db"), dir.path().join("images"));
        store.create("napoleon", "Napoleon", "d", "p", None, None).unwrap();
        let engine = HybridSearchEngine::new(dir.path().join("chroma_db/bm25_indexes"), 60, 3, 30, 0.05);
        let text_processor = TextProcessor::new(Default::default());
        (dir, store, engine, text_processor)
    }

    #[test]
    fn empty_query_returns_empty() {
        let (_dir, store, engine, tp) = setup();
        let results = engine.search("napoleon", "", 5, None, &store, &FakeEmbedder, &tp).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn empty_collection_returns_empty_regardless_of_bm25() {
        let (_dir, store, engine, tp) = setup();
        let results = engine.search("napoleon", "napoleon", 5, None, &store, &FakeEmbedder, &tp).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn threshold_filters_unrelated_queries() {
        let (_dir, store, engine, tp) = setup();
        store
            .add_chunk(
                "napoleon",
                StoredChunk {
                    chunk_id: "napoleon_abc".into(),
                    text: "Napoleon ruled France".into(),
                    vector: fake_vector("napoleon ruled france"),
                    metadata: meta(),
                    processed_tokens: vec!["napoleon".into(), "rule".into(), "franc".into()],
                },
            )
            .unwrap();

        let results = engine.search("napoleon", "cat", 5, Some(0.9), &store, &FakeEmbedder, &tp).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn matching_query_returns_chunk_with_positive_rrf() {
        let (_dir, store, engine, tp) = setup();
        store
            .add_chunk(
                "napoleon",
                StoredChunk {
                    chunk_id: "napoleon_abc".into(),
                    text: "Napoleon ruled France".into(),
                    vector: fake_vector("napoleon ruled france"),
                    metadata: meta(),
                    processed_tokens: vec!["napoleon".into(), "rule".into(), "franc".into()],
                },
            )
            .unwrap();

        let results = engine.search("napoleon", "napoleon", 5, None, &store, &FakeEmbedder, &tp).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].rrf_score > 0.0);
    }

    #[test]
    fn concurrent_rebuild_happens_once() {
        let (_dir, store, engine, _tp) = setup();
        store
            .add_chunk(
                "napoleon",
                StoredChunk {
                    chunk_id: "napoleon_abc".into(),
                    text: "Napoleon ruled France".into(),
                    vector: fake_vector("napoleon ruled france"),
                    metadata: meta(),
                    processed_tokens: vec!["napoleon".into(), "rule".into(), "franc".into()],
                },
            )
            .unwrap();

        engine.ensure_bm25("napoleon", &store).unwrap();
        engine.ensure_bm25("napoleon", &store).unwrap();
        assert_eq!(engine.rebuild_count("napoleon"), 1);
    }

    #[test]
    fn invalidate_removes_cache_and_files() {
        let (dir, store, engine, _tp) = setup();
        store
            .add_chunk(
                "napoleon",
                StoredChunk {
                    chunk_id: "napoleon_abc".into(),
                    text: "Napoleon ruled France".into(),
                    vector: fake_vector("napoleon ruled france"),
                    metadata: meta(),
                    processed_tokens: vec!["napoleon".into()],
                },
            )
            .unwrap();
        engine.ensure_bm25("napoleon", &store).unwrap();
        engine.invalidate("napoleon");
        assert_eq!(engine.cache.read().get("napoleon").is_none(), true);
        let paths = paths_for(&dir.path().join("chroma_db/bm25_indexes"), "napoleon");
        assert!(!paths.index.exists());
    }
}
