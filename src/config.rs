//! Configuration surface — environment-overridable settings plus startup
//! validation.
//!
//! All tunables from spec §6 live here: chunk sizing, similarity threshold,
//! RRF/search constants, embedding source selection, and filesystem roots.
//! [`AppConfig::from_env`] aborts (returns `Err`) rather than silently
//! clamping an invalid *fatal* setting — the caller (`main`) turns that into
//! a process-exit diagnostic, per spec §7 "Fatal conditions".

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// Which backend [`crate::embedding::EmbeddingProvider`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingSource {
    Local,
    External,
}

impl EmbeddingSource {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Self::Local),
            "external" => Some(Self::External),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub max_chunk_chars: usize,
    pub overlap_percent: usize,
    pub min_cosine_similarity: f32,
    pub search_multiplier: usize,
    pub max_search_results: usize,
    pub rrf_k: usize,

    pub embedding_source: EmbeddingSource,
    pub local_embedding_model: String,
    pub external_embedding_model: String,
    pub embedding_api_url: String,
    pub embedding_api_key: String,

    pub figures_dir: PathBuf,
    pub vector_store_dir: PathBuf,
    pub bm25_dir: PathBuf,
    pub stopwords_dir: PathBuf,
    pub figure_images_dir: PathBuf,

    pub max_file_size_bytes: u64,
    pub max_request_size_bytes: u64,

    pub session_timeout_secs: u64,
    pub session_reap_interval_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize(key: &str, default: usize) -> Result<usize> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<usize>()
            .with_context(|| format!("{key} must be an integer, got {v:?}")),
        Err(_) => Ok(default),
    }
}

fn env_f32(key: &str, default: f32) -> Result<f32> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<f32>()
            .with_context(|| format!("{key} must be a float, got {v:?}")),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Reads every knob from the environment, applies defaults, clamps the
    /// ranges spec §4.B/§6 define, and fails fast on genuinely fatal
    /// misconfiguration (unknown embedding source, missing external API key,
    /// chunk size configured below the 100-char floor).
    pub fn from_env() -> Result<Self> {
        let max_chunk_chars = env_usize("MAX_CHUNK_CHARS", 1000)?.clamp(500, 3000);
        let overlap_percent = env_usize("OVERLAP_PERCENT", 20)?.clamp(0, 50);
        let min_cosine_similarity = env_f32("MIN_COSINE_SIMILARITY", 0.05)?.clamp(0.0, 1.0);
        let search_multiplier = env_usize("SEARCH_MULTIPLIER", 3)?;
        let max_search_results = env_usize("MAX_SEARCH_RESULTS", 30)?;
        let rrf_k = env_usize("RRF_K", 60)?;

        if env_usize("MAX_CHUNK_CHARS", 1000)? < 100 {
            bail!("MAX_CHUNK_CHARS must be at least 100 characters");
        }

        let source_str = env_or("EMBEDDING_SOURCE", "local");
        let embedding_source = EmbeddingSource::parse(&source_str)
            .with_context(|| format!("EMBEDDING_SOURCE must be 'local' or 'external', got {source_str:?}"))?;

        let embedding_api_key = env_or("EMBEDDING_API_KEY", "");
        if embedding_source == EmbeddingSource::External && embedding_api_key.is_empty() {
            bail!("EMBEDDING_API_KEY is required when EMBEDDING_SOURCE=external");
        }

        Ok(Self {
            max_chunk_chars,
            overlap_percent,
            min_cosine_similarity,
            search_multiplier,
            max_search_results,
            rrf_k,
            embedding_source,
            local_embedding_model: env_or("LOCAL_EMBEDDING_MODEL", "sentence-transformers/all-MiniLM-L6-v2"),
            external_embedding_model: env_or("EXTERNAL_EMBEDDING_MODEL", "text-embedding-3-small"),
            embedding_api_url: env_or("EMBEDDING_API_URL", "https://api.openai.com/v1"),
            embedding_api_key,
            figures_dir: PathBuf::from(env_or("FIGURES_DIR", "./figures")),
            vector_store_dir: PathBuf::from(env_or("CHROMA_DB_PATH", "./chroma_db")),
            bm25_dir: PathBuf::from(env_or("CHROMA_DB_PATH", "./chroma_db")).join("bm25_indexes"),
            stopwords_dir: PathBuf::from(env_or("STOPWORDS_DIR", "./data/stopwords")),
            figure_images_dir: PathBuf::from(env_or("FIGURE_IMAGES_DIR", "./static/figure_images")),
            max_file_size_bytes: 50 * 1024 * 1024,
            max_request_size_bytes: 500 * 1024 * 1024,
            session_timeout_secs: 24 * 60 * 60,
            session_reap_interval_secs: 60 * 60,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_embedding_source() {
        std::env::set_var("EMBEDDING_SOURCE", "carrier-pigeon");
        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("EMBEDDING_SOURCE"));
        std::env::remove_var("EMBEDDING_SOURCE");
    }

    #[test]
    fn clamps_chunk_chars_into_range() {
        std::env::set_var("MAX_CHUNK_CHARS", "50000");
        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.max_chunk_chars, 3000);
        std::env::remove_var("MAX_CHUNK_CHARS");
    }
}
