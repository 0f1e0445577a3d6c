//! Shared application state.
//!
//! Mirrors the two-phase startup pattern the server is built around: the
//! HTTP listener binds and starts serving `/healthz` and figure CRUD
//! immediately, while the embedding model (a multi-hundred-megabyte
//! download on first run) loads in the background on a blocking thread.
//! Handlers that need the model check `AppState::embedder.get()` and
//! return a 503 until it resolves, rather than blocking the request.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::embedding::EmbeddingProvider;
use crate::search::HybridSearchEngine;
use crate::store::FigureStore;
use crate::text::TextProcessor;
use crate::web::events::IngestionEvent;

pub type ModelState = Arc<OnceLock<Arc<dyn EmbeddingProvider>>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<FigureStore>,
    pub search: Arc<HybridSearchEngine>,
    pub text_processor: Arc<TextProcessor>,
    /// Filled in by `main`'s background loader, mirroring the teacher's
    /// `OnceLock<ModelReady>` two-phase init.
    pub embedder: ModelState,
    pub events_tx: Arc<broadcast::Sender<IngestionEvent>>,
    /// Last-touched timestamp per session id, swept by the hourly reaper
    /// (spec §5: 24-hour inactivity timeout).
    pub session_activity: Arc<RwLock<HashMap<String, Instant>>>,
}
