//! Entry point for the per-figure hybrid retrieval server.
//!
//! Startup follows the same two-phase pattern as the system this was
//! distilled from: the HTTP listener binds and starts serving figure CRUD
//! immediately, while the embedding backend (a local model download can run
//! to several hundred megabytes) loads on a blocking thread in the
//! background. Handlers that need the embedder check `AppState::embedder`
//! and return 503 until it resolves.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use histfig_core::config::{AppConfig, EmbeddingSource};
use histfig_core::embedding::external::ExternalEmbeddingProvider;
use histfig_core::embedding::local::LocalEmbeddingProvider;
use histfig_core::embedding::EmbeddingProvider;
use histfig_core::search::HybridSearchEngine;
use histfig_core::store::FigureStore;
use histfig_core::text::TextProcessor;
use histfig_core::web::events::IngestionEvent;
use histfig_core::web::state::AppState;
use histfig_core::web;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Configuration is validated fully at startup; a bad EMBEDDING_SOURCE or
    // an undersized chunk budget aborts the process here rather than
    // surfacing as a confusing runtime error later (spec §7 "Fatal
    // conditions").
    let config = Arc::new(AppConfig::from_env().context("invalid configuration")?);

    tracing::info!(
        max_chunk_chars = config.max_chunk_chars,
        overlap_percent = config.overlap_percent,
        embedding_source = ?config.embedding_source,
        "starting retrieval server"
    );

    let store = Arc::new(FigureStore::new(
        config.figures_dir.clone(),
        config.vector_store_dir.clone(),
        config.figure_images_dir.clone(),
    ));
    let search = Arc::new(HybridSearchEngine::new(
        config.bm25_dir.clone(),
        config.rrf_k,
        config.search_multiplier,
        config.max_search_results,
        config.min_cosine_similarity,
    ));
    let text_processor = Arc::new(TextProcessor::from_dir(&config.stopwords_dir));

    let embedder: Arc<OnceLock<Arc<dyn EmbeddingProvider>>> = Arc::new(OnceLock::new());
    let (events_tx, _) = broadcast::channel::<IngestionEvent>(256);
    let events_tx = Arc::new(events_tx);

    let state = AppState {
        config: config.clone(),
        store,
        search,
        text_processor,
        embedder: embedder.clone(),
        events_tx,
        session_activity: Arc::new(RwLock::new(HashMap::new())),
    };

    let app = web::create_router(state.clone());

    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    // The embedding model is loaded exactly once per process and shared
    // across every request (spec §5 "Resource policy"); loading it on a
    // blocking thread keeps the async runtime free to serve figure CRUD and
    // health checks while a local model downloads.
    tokio::task::spawn_blocking(move || {
        let provider: Result<Arc<dyn EmbeddingProvider>> = match config.embedding_source {
            EmbeddingSource::Local => {
                tracing::info!(model = %config.local_embedding_model, "loading local embedding model");
                LocalEmbeddingProvider::load(&config.local_embedding_model)
                    .map(|p| Arc::new(p) as Arc<dyn EmbeddingProvider>)
            }
            EmbeddingSource::External => Ok(Arc::new(ExternalEmbeddingProvider::new(
                config.embedding_api_url.clone(),
                config.embedding_api_key.clone(),
                config.external_embedding_model.clone(),
            )) as Arc<dyn EmbeddingProvider>),
        };

        match provider {
            Ok(provider) => {
                let _ = embedder.set(provider);
                tracing::info!("embedding provider ready");
            }
            Err(e) => tracing::error!(error = %e, "failed to initialize embedding provider"),
        }
    });

    // Hourly sweep of session records past their 24h inactivity timeout
    // (spec §5): the session lock is held only while collecting and
    // deleting expired ids, never across any blocking work.
    tokio::spawn(reap_expired_sessions(state.session_activity.clone(), state.config.clone()));

    axum::serve(listener, app).await?;
    Ok(())
}

async fn reap_expired_sessions(
    session_activity: Arc<RwLock<HashMap<String, std::time::Instant>>>,
    config: Arc<AppConfig>,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(config.session_reap_interval_secs));
    let timeout = std::time::Duration::from_secs(config.session_timeout_secs);
    loop {
        interval.tick().await;
        let expired: Vec<String> = {
            let guard = session_activity.read();
            let now = std::time::Instant::now();
            guard
                .iter()
                .filter(|(_, last_touched)| now.duration_since(**last_touched) > timeout)
                .map(|(id, _)| id.clone())
                .collect()
        };
        if expired.is_empty() {
            continue;
        }
        let mut guard = session_activity.write();
        for id in &expired {
            guard.remove(id);
        }
        tracing::info!(count = expired.len(), "reaped expired sessions");
    }
}
