//! HTTP handlers for the figure CRUD, search, and ingestion endpoints
//! (spec §6). Each handler is a thin Axum wrapper around the library
//! modules — no retrieval logic lives here.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::StreamExt;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;

use super::events::IngestionEvent;
use super::state::AppState;
use crate::document;
use crate::document::Chunk;
use crate::error::{CoreError, CoreResult};
use crate::search::FusedResult;
use crate::store::{generate_chunk_id, ChunkMetadata, Figure, FigureUpdate, StoredChunk};

/// Wraps [`CoreError`] (and the "model not ready" condition) into an HTTP
/// response, mapping each kind to the status code spec §7 implies.
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Embedding(_) | CoreError::Index(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Transport(_) => StatusCode::BAD_GATEWAY,
        };
        Self(status, err.to_string())
    }
}

fn model_loading() -> ApiError {
    ApiError(StatusCode::SERVICE_UNAVAILABLE, "embedding model is still loading".to_string())
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_ready: bool,
}

pub async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", model_ready: state.embedder.get().is_some() })
}

#[derive(Deserialize)]
pub struct CreateFigureRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub persona_prompt: String,
    pub birth_year: Option<i32>,
    pub death_year: Option<i32>,
}

pub async fn create_figure(
    State(state): State<AppState>,
    Json(req): Json<CreateFigureRequest>,
) -> Result<Json<Figure>, ApiError> {
    let figure = state.store.create(
        &req.id,
        &req.name,
        &req.description,
        &req.persona_prompt,
        req.birth_year,
        req.death_year,
    )?;
    Ok(Json(figure))
}

pub async fn list_figures(State(state): State<AppState>) -> Result<Json<Vec<Figure>>, ApiError> {
    Ok(Json(state.store.list()?))
}

pub async fn get_figure(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Figure>, ApiError> {
    Ok(Json(state.store.get(&id)?))
}

#[derive(Deserialize, Default)]
pub struct UpdateFigureRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub persona_prompt: Option<String>,
    #[serde(default)]
    pub birth_year: Option<Option<i32>>,
    #[serde(default)]
    pub death_year: Option<Option<i32>>,
}

pub async fn update_figure(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateFigureRequest>,
) -> Result<Json<Figure>, ApiError> {
    let figure = state.store.update(
        &id,
        FigureUpdate {
            name: req.name,
            description: req.description,
            persona_prompt: req.persona_prompt,
            birth_year: req.birth_year,
            death_year: req.death_year,
        },
    )?;
    Ok(Json(figure))
}

pub async fn delete_figure(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.store.delete(&id)?;
    state.search.invalidate(&id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_figure_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Figure>, ApiError> {
    state.store.clear(&id)?;
    state.search.invalidate(&id);
    Ok(Json(state.store.get(&id)?))
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    pub min_cosine_similarity: Option<f32>,
}

fn default_n_results() -> usize {
    5
}

pub async fn search_figure(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Vec<FusedResult>>, ApiError> {
    state.store.get(&id)?;
    let embedder = state.embedder.get().ok_or_else(model_loading)?;
    let results = state.search.search(
        &id,
        &req.query,
        req.n_results,
        req.min_cosine_similarity,
        &state.store,
        embedder.as_ref(),
        &state.text_processor,
    )?;
    Ok(Json(results))
}

/// GET `/events` — SSE stream of ingestion progress, shared across every
/// figure (spec §6). Lagged messages are silently dropped; a keep-alive
/// fires every 15s so idle proxy connections aren't torn down.
pub async fn sse_events(
    State(state): State<AppState>,
) -> Sse<impl futures_util::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.events_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => Some(Ok(SseEvent::default().data(serde_json::to_string(&event).ok()?))),
            Err(_) => None,
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
}

/// POST `/figures/{id}/documents` — accepts a multipart upload of one or
/// more files, kicks off ingestion on a blocking task, and returns
/// immediately; progress streams over `/events` (spec §6 "Ingestion API").
pub async fn upload_documents(
    State(state): State<AppState>,
    Path(figure_id): Path<String>,
    mut multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    state.store.get(&figure_id)?;
    let embedder = state.embedder.get().ok_or_else(model_loading)?.clone();

    let mut files = Vec::new();
    let mut total_bytes: u64 = 0;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(StatusCode::BAD_REQUEST, format!("malformed multipart body: {e}")))?
    {
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError(StatusCode::BAD_REQUEST, format!("failed to read upload: {e}")))?;
        total_bytes += bytes.len() as u64;
        if total_bytes > state.config.max_request_size_bytes {
            return Err(ApiError(
                StatusCode::PAYLOAD_TOO_LARGE,
                "total upload size exceeds the request limit".to_string(),
            ));
        }
        files.push((filename, bytes.to_vec()));
    }

    let store = state.store.clone();
    let search = state.search.clone();
    let text_processor = state.text_processor.clone();
    let config = state.config.clone();
    let events_tx = state.events_tx.clone();

    tokio::task::spawn_blocking(move || {
        ingest_files(figure_id, files, store, search, embedder, text_processor, config, events_tx);
    });

    Ok(StatusCode::ACCEPTED)
}

/// Extracts, chunks, tokenizes, embeds, and persists every chunk of every
/// uploaded file, emitting SSE progress along the way. Per-file failures
/// are captured and reported without failing the whole batch (spec §7:
/// "the request as a whole succeeds if any file succeeds").
fn ingest_files(
    figure_id: String,
    files: Vec<(String, Vec<u8>)>,
    store: std::sync::Arc<crate::store::FigureStore>,
    search: std::sync::Arc<crate::search::HybridSearchEngine>,
    embedder: std::sync::Arc<dyn crate::embedding::EmbeddingProvider>,
    text_processor: std::sync::Arc<crate::text::TextProcessor>,
    config: std::sync::Arc<crate::config::AppConfig>,
    events_tx: std::sync::Arc<tokio::sync::broadcast::Sender<IngestionEvent>>,
) {
    let overlap_chars = config.max_chunk_chars * config.overlap_percent / 100;
    let mut files_processed = 0usize;

    for (filename, bytes) in files {
        if bytes.len() as u64 > config.max_file_size_bytes {
            let _ = events_tx.send(IngestionEvent::FileError {
                figure_id: figure_id.clone(),
                filename,
                message: "file exceeds the per-file size limit".to_string(),
            });
            continue;
        }

        let _ =
            events_tx.send(IngestionEvent::FileStart { figure_id: figure_id.clone(), filename: filename.clone() });

        let processed = match document::process_file(&filename, &bytes, config.max_chunk_chars, overlap_chars) {
            Ok(p) => p,
            Err(e) => {
                let _ = events_tx.send(IngestionEvent::FileError {
                    figure_id: figure_id.clone(),
                    filename,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let total_chunks = processed.chunks.len();
        let _ = events_tx.send(IngestionEvent::ChunksCount {
            figure_id: figure_id.clone(),
            filename: filename.clone(),
            total_chunks,
        });

        // Embedding and tokenization are independent per chunk and both
        // CPU-bound (spec §5 "suspension points"), so they run across
        // rayon's thread pool while the append to the figure store stays
        // sequential, preserving the source-order guarantee spec §5 requires
        // within a single ingestion call.
        let embedded: Vec<(Chunk, CoreResult<Vec<f32>>, Vec<String>)> = processed
            .chunks
            .into_par_iter()
            .map(|chunk| {
                let vector = embedder.encode_document(&chunk.text);
                let processed_tokens = text_processor.process_text(&chunk.text, (1, 2));
                (chunk, vector, processed_tokens)
            })
            .collect();

        let mut chunks_added = 0usize;
        for (chunk, vector, processed_tokens) in embedded {
            let vector = match vector {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(figure = %figure_id, file = %filename, error = %e, "embedding failed for chunk, skipping");
                    continue;
                }
            };
            if processed_tokens.is_empty() {
                tracing::warn!(figure = %figure_id, file = %filename, "chunk has no processed tokens, BM25 search may be limited");
            }

            let stored = StoredChunk {
                chunk_id: generate_chunk_id(&figure_id),
                text: chunk.text,
                vector,
                metadata: ChunkMetadata {
                    filename: processed.metadata.filename.clone(),
                    original_filename: filename.clone(),
                    file_type: processed.metadata.file_type.clone(),
                    file_size: processed.metadata.file_size,
                    chunk_index: chunk.index,
                    total_chunks: chunk.total_chunks,
                    start_char: chunk.start_char,
                    end_char: chunk.end_char,
                    char_count: chunk.end_char - chunk.start_char,
                },
                processed_tokens,
            };

            if let Err(e) = store.add_chunk(&figure_id, stored) {
                tracing::warn!(figure = %figure_id, file = %filename, error = %e, "failed to persist chunk");
                continue;
            }
            chunks_added += 1;
            let _ = events_tx.send(IngestionEvent::ChunkProgress {
                figure_id: figure_id.clone(),
                filename: filename.clone(),
                chunk_index: chunk.index,
                total_chunks,
            });
        }

        if let Err(e) = store.sync_document_count(&figure_id) {
            tracing::warn!(figure = %figure_id, error = %e, "failed to sync document count");
        }
        let _ = events_tx.send(IngestionEvent::FileComplete { figure_id: figure_id.clone(), filename, chunks_added });
        files_processed += 1;
    }

    // Invalidate once per batch, not per chunk (spec §5 ordering guarantees).
    search.invalidate(&figure_id);
    let _ = events_tx.send(IngestionEvent::UploadComplete { figure_id, files_processed });
}
