//! Figure Store (spec §4.D) — source of truth for figures and their
//! chunks: metadata on disk, dense vectors in [`vector::VectorCollection`].

pub mod vector;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
pub use vector::{ChunkMetadata, DenseHit, StoredChunk, VectorCollection};

const MAX_FIELD_LEN: usize = 400;
const MAX_NAME_LEN: usize = 100;
const MAX_ID_LEN: usize = 50;

static FIGURE_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z]+$").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub id: String,
    pub name: String,
    pub description: String,
    pub persona_prompt: String,
    pub birth_year: Option<i32>,
    pub death_year: Option<i32>,
    pub image_ext: Option<String>,
    pub created_at: DateTime<Utc>,
    pub document_count: usize,
}

#[derive(Debug, Default)]
pub struct FigureUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub persona_prompt: Option<String>,
    pub birth_year: Option<Option<i32>>,
    pub death_year: Option<Option<i32>>,
}

/// `id` must be non-empty, ASCII-letters-only, and at most 50 chars (spec
/// §3: "Identifier matching `[a-zA-Z]+`").
pub fn validate_figure_id(id: &str) -> CoreResult<()> {
    if id.is_empty() {
        return Err(CoreError::validation("figure id is required"));
    }
    if id.chars().count() > MAX_ID_LEN {
        return Err(CoreError::validation(format!("figure id must be at most {MAX_ID_LEN} characters")));
    }
    if !FIGURE_ID_RE.is_match(id) {
        return Err(CoreError::validation("figure id must contain only letters a-z/A-Z"));
    }
    Ok(())
}

/// Display names allow Unicode letters and spaces only, up to 100 chars
/// (spec §3: "display name (letters + spaces, Unicode permitted)").
pub fn validate_figure_name(name: &str) -> CoreResult<()> {
    if name.trim().is_empty() {
        return Err(CoreError::validation("figure name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::validation(format!("figure name must be at most {MAX_NAME_LEN} characters")));
    }
    if !name.chars().all(|c| c.is_alphabetic() || c.is_whitespace()) {
        return Err(CoreError::validation("figure name must contain only letters and spaces"));
    }
    Ok(())
}

/// Description and persona prompt share the same 400-char cap (spec §3).
pub fn validate_short_field(value: &str, field_name: &str) -> CoreResult<()> {
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(CoreError::validation(format!("{field_name} must be at most {MAX_FIELD_LEN} characters")));
    }
    Ok(())
}

pub fn validate_year(year: Option<i32>) -> CoreResult<()> {
    match year {
        Some(y) if !(-3000..=2100).contains(&y) => {
            Err(CoreError::validation("year must be between -3000 and 2100"))
        }
        _ => Ok(()),
    }
}

/// Generates a chunk id `<figure_id>_<12 hex chars>` (spec §4.D, §9 "Chunk
/// id strategy"). Collision probability is negligible at expected scales;
/// ids are never reused once assigned.
pub fn generate_chunk_id(figure_id: &str) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..12).map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap()).collect();
    format!("{figure_id}_{suffix}")
}

struct Collections {
    map: RwLock<HashMap<String, Arc<RwLock<VectorCollection>>>>,
}

impl Collections {
    fn new() -> Self {
        Self { map: RwLock::new(HashMap::new()) }
    }

    fn get_or_load(&self, figure_id: &str, path: &Path) -> CoreResult<Arc<RwLock<VectorCollection>>> {
        if let Some(existing) = self.map.read().get(figure_id) {
            return Ok(existing.clone());
        }
        let loaded = Arc::new(RwLock::new(VectorCollection::load(path)?));
        self.map.write().insert(figure_id.to_string(), loaded.clone());
        Ok(loaded)
    }

    fn remove(&self, figure_id: &str) {
        self.map.write().remove(figure_id);
    }

    fn reset(&self, figure_id: &str) {
        self.map.write().insert(figure_id.to_string(), Arc::new(RwLock::new(VectorCollection::default())));
    }
}

/// Source of truth for figures and their chunks (spec §4.D). Figure
/// metadata is read/written straight from disk (one small JSON file per
/// figure, infrequently touched); vector collections are cached in memory
/// behind per-figure locks so concurrent reads don't block on each other
/// and writes only hold the lock around the atomic append (spec §5).
pub struct FigureStore {
    figures_dir: PathBuf,
    vector_store_dir: PathBuf,
    figure_images_dir: PathBuf,
    collections: Collections,
    metadata_lock: RwLock<()>,
}

impl FigureStore {
    pub fn new(figures_dir: PathBuf, vector_store_dir: PathBuf, figure_images_dir: PathBuf) -> Self {
        Self {
            figures_dir,
            vector_store_dir,
            figure_images_dir,
            collections: Collections::new(),
            metadata_lock: RwLock::new(()),
        }
    }

    fn figure_dir(&self, id: &str) -> PathBuf {
        self.figures_dir.join(id)
    }

    fn metadata_path(&self, id: &str) -> PathBuf {
        self.figure_dir(id).join("metadata.json")
    }

    fn collection_path(&self, id: &str) -> PathBuf {
        vector::collection_path(&self.vector_store_dir, id)
    }

    /// Creates a figure's directory, metadata file, and empty vector
    /// collection. Fails if either already exists (spec §3: "creating a
    /// figure is idempotently forbidden if either side already exists").
    pub fn create(
        &self,
        id: &str,
        name: &str,
        description: &str,
        persona_prompt: &str,
        birth_year: Option<i32>,
        death_year: Option<i32>,
    ) -> CoreResult<Figure> {
        validate_figure_id(id)?;
        validate_figure_name(name)?;
        validate_short_field(description, "description")?;
        validate_short_field(persona_prompt, "persona prompt")?;
        validate_year(birth_year)?;
        validate_year(death_year)?;

        let _guard = self.metadata_lock.write();

        let dir = self.figure_dir(id);
        if dir.exists() {
            return Err(CoreError::validation(format!("figure {id:?} already exists")));
        }
        if self.collection_path(id).exists() {
            return Err(CoreError::validation(format!("vector collection for {id:?} already exists")));
        }

        std::fs::create_dir_all(&dir)
            .map_err(|e| CoreError::index(format!("failed to create figure directory: {e}")))?;

        let figure = Figure {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            persona_prompt: persona_prompt.to_string(),
            birth_year,
            death_year,
            image_ext: None,
            created_at: Utc::now(),
            document_count: 0,
        };
        self.write_metadata(&figure)?;
        VectorCollection::default().save(&self.collection_path(id))?;

        Ok(figure)
    }

    fn write_metadata(&self, figure: &Figure) -> CoreResult<()> {
        let bytes = serde_json::to_vec_pretty(figure)
            .map_err(|e| CoreError::index(format!("failed to serialize figure metadata: {e}")))?;
        std::fs::write(self.metadata_path(&figure.id), bytes)
            .map_err(|e| CoreError::index(format!("failed to write figure metadata: {e}")))
    }

    pub fn get(&self, id: &str) -> CoreResult<Figure> {
        let path = self.metadata_path(id);
        let bytes = std::fs::read(&path).map_err(|_| CoreError::not_found(format!("figure {id:?} not found")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::index(format!("corrupt figure metadata for {id:?}: {e}")))
    }

    pub fn list(&self) -> CoreResult<Vec<Figure>> {
        let entries = match std::fs::read_dir(&self.figures_dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };

        let mut figures = Vec::new();
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str() {
                if let Ok(figure) = self.get(id) {
                    figures.push(figure);
                }
            }
        }
        figures.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(figures)
    }

    pub fn update(&self, id: &str, update: FigureUpdate) -> CoreResult<Figure> {
        let _guard = self.metadata_lock.write();
        let mut figure = self.get(id)?;

        if let Some(name) = update.name {
            validate_figure_name(&name)?;
            figure.name = name;
        }
        if let Some(description) = update.description {
            validate_short_field(&description, "description")?;
            figure.description = description;
        }
        if let Some(persona_prompt) = update.persona_prompt {
            validate_short_field(&persona_prompt, "persona prompt")?;
            figure.persona_prompt = persona_prompt;
        }
        if let Some(birth_year) = update.birth_year {
            validate_year(birth_year)?;
            figure.birth_year = birth_year;
        }
        if let Some(death_year) = update.death_year {
            validate_year(death_year)?;
            figure.death_year = death_year;
        }

        self.write_metadata(&figure)?;
        Ok(figure)
    }

    /// Removes a figure's collection, image, and directory. Every step is
    /// attempted even if an earlier one fails; only directory removal is
    /// fatal (spec §4.D `delete`).
    pub fn delete(&self, id: &str) -> CoreResult<()> {
        let _guard = self.metadata_lock.write();

        if !self.figure_dir(id).exists() {
            return Err(CoreError::not_found(format!("figure {id:?} not found")));
        }

        self.collections.remove(id);
        if let Err(e) = std::fs::remove_file(self.collection_path(id)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(figure = id, error = %e, "failed to remove vector collection file");
            }
        }

        if let Ok(entries) = std::fs::read_dir(&self.figure_images_dir) {
            for entry in entries.flatten() {
                if entry.path().file_stem().and_then(|s| s.to_str()) == Some(id) {
                    if let Err(e) = std::fs::remove_file(entry.path()) {
                        tracing::warn!(figure = id, error = %e, "failed to remove figure image");
                    }
                }
            }
        }

        std::fs::remove_dir_all(self.figure_dir(id))
            .map_err(|e| CoreError::index(format!("failed to remove figure directory: {e}")))
    }

    fn collection(&self, id: &str) -> CoreResult<Arc<RwLock<VectorCollection>>> {
        self.collections.get_or_load(id, &self.collection_path(id))
    }

    /// Appends a chunk atomically: the caller supplies the already-embedded
    /// vector and already-tokenized token list so nothing partial is ever
    /// visible to a concurrent reader (spec §4.D `add_chunk`, §5 ordering
    /// guarantees).
    pub fn add_chunk(&self, figure_id: &str, chunk: StoredChunk) -> CoreResult<String> {
        if chunk.processed_tokens.is_empty() {
            tracing::warn!(figure = figure_id, chunk = %chunk.chunk_id, "chunk has no processed tokens, BM25 search may be limited");
        }

        let collection = self.collection(figure_id)?;
        let chunk_id = chunk.chunk_id.clone();
        {
            let mut guard = collection.write();
            guard.add_chunk(chunk);
            guard.save(&self.collection_path(figure_id))?;
        }
        Ok(chunk_id)
    }

    /// Drops and recreates an empty collection, then resets
    /// `document_count` to 0 (spec §4.D `clear`). BM25 invalidation is the
    /// search engine's responsibility, triggered by the caller after this
    /// returns.
    pub fn clear(&self, figure_id: &str) -> CoreResult<()> {
        self.collections.reset(figure_id);
        VectorCollection::default().save(&self.collection_path(figure_id))?;
        self.sync_document_count(figure_id)?;
        Ok(())
    }

    pub fn query_dense(&self, figure_id: &str, query_vector: &[f32], n: usize) -> CoreResult<Vec<DenseHit>> {
        let collection = self.collection(figure_id)?;
        Ok(collection.read().query_dense(query_vector, n))
    }

    pub fn collection_len(&self, figure_id: &str) -> CoreResult<usize> {
        let collection = self.collection(figure_id)?;
        Ok(collection.read().len())
    }

    /// Reconciles `document_count` in metadata with the vector
    /// collection's actual size (spec §3 invariant 3).
    pub fn sync_document_count(&self, figure_id: &str) -> CoreResult<Figure> {
        let _guard = self.metadata_lock.write();
        let mut figure = self.get(figure_id)?;
        figure.document_count = self.collection_len(figure_id)?;
        self.write_metadata(&figure)?;
        Ok(figure)
    }

    /// Iterates every chunk's token list for a figure, used by the search
    /// engine to rebuild BM25 from the source of truth (spec §4.E.1
    /// `Preload`).
    pub fn with_chunks<R>(&self, figure_id: &str, f: impl FnOnce(&[StoredChunk]) -> R) -> CoreResult<R> {
        let collection = self.collection(figure_id)?;
        let guard = collection.read();
        Ok(f(guard.chunks()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> FigureStore {
        FigureStore::new(dir.join("figures"), dir.join("chroma_db"), dir.join("static/figure_images"))
    }

    #[test]
    fn rejects_ids_with_digits() {
        assert!(validate_figure_id("napoleon1").is_err());
        assert!(validate_figure_id("napoleon").is_ok());
    }

    #[test]
    fn create_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let figure = store.create("napoleon", "Napoleon", "French emperor", "Speak imperiously.", Some(1769), Some(1821)).unwrap();
        assert_eq!(figure.document_count, 0);

        let fetched = store.get("napoleon").unwrap();
        assert_eq!(fetched.name, "Napoleon");
    }

    #[test]
    fn create_twice_fails() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.create("napoleon", "Napoleon", "d", "p", None, None).unwrap();
        assert!(store.create("napoleon", "Napoleon", "d", "p", None, None).is_err());
    }

    #[test]
    fn delete_unknown_figure_is_not_found() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(matches!(store.delete("napoleon"), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn delete_then_create_yields_zero_chunks() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.create("napoleon", "Napoleon", "d", "p", None, None).unwrap();
        store.delete("napoleon").unwrap();
        let figure = store.create("napoleon", "Napoleon", "d", "p", None, None).unwrap();
        assert_eq!(figure.document_count, 0);
        assert_eq!(store.collection_len("napoleon").unwrap(), 0);
    }

    #[test]
    fn clear_resets_document_count() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.create("napoleon", "Napoleon", "d", "p", None, None).unwrap();
        store
            .add_chunk(
                "napoleon",
                StoredChunk {
                    chunk_id: "napoleon_abc123".into(),
                    text: "text".into(),
                    vector: vec![1.0, 0.0],
                    metadata: ChunkMetadata {
                        filename: "f.txt".into(),
                        original_filename: "f.txt".into(),
                        file_type: "txt".into(),
                        file_size: 4,
                        chunk_index: 0,
                        total_chunks: 1,
                        start_char: 0,
                        end_char: 4,
                        char_count: 4,
                    },
                    processed_tokens: vec!["text".into()],
                },
            )
            .unwrap();
        store.sync_document_count("napoleon").unwrap();
        assert_eq!(store.get("napoleon").unwrap().document_count, 1);

        store.clear("napoleon").unwrap();
        assert_eq!(store.get("napoleon").unwrap().document_count, 0);
    }
}
