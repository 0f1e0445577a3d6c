//! Integration tests driving the real Axum router end to end (spec §8
//! end-to-end scenarios), with a deterministic fake embedder standing in
//! for the local/external backends so these tests run without a model
//! download or network access.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower::ServiceExt;

use histfig_core::config::AppConfig;
use histfig_core::embedding::{l2_normalize, EmbeddingProvider};
use histfig_core::error::CoreResult;
use histfig_core::search::HybridSearchEngine;
use histfig_core::store::FigureStore;
use histfig_core::text::TextProcessor;
use histfig_core::web::state::AppState;

/// Embeds on a single lexical feature so "napoleon"-flavored queries and
/// documents land near each other in cosine space without any model.
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
    let lower = text.to_lowercase();
    let mut v = vec![
        lower.contains("napoleon") as i32 as f32,
        lower.contains("emperor") as i32 as f32,
        lower.contains("cat") as i32 as f32,
    ];
    l2_normalize(&mut v);
    if v.iter().all(|x| *x == 0.0) {
        v = vec![0.1, 0.1, 0.1];
    }
    v
}

fn test_state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::from_env().unwrap_or_else(|_| panic!("default config should be valid"));
    config.figures_dir = dir.path().join("figures");
    config.vector_store_dir = dir.path().join("chroma_db");
    config.bm25_dir = dir.path().join("chroma_db/bm25_indexes");
    config.figure_images_dir = dir.path().join("static/figure_images");
    let config = Arc::new(config);

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
    let text_processor = Arc::new(TextProcessor::new(Default::default()));

    let embedder: Arc<OnceLock<Arc<dyn EmbeddingProvider>>> = Arc::new(OnceLock::new());
    let _ = embedder.set(Arc::new(FakeEmbedder) as Arc<dyn EmbeddingProvider>);

    let (events_tx, _) = broadcast::channel(16);
    let state = AppState {
        config,
        store,
        search,
        text_processor,
        embedder,
        events_tx: Arc::new(events_tx),
        session_activity: Arc::new(RwLock::new(HashMap::new())),
    };
    (dir, state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_reports_model_ready() {
    let (_dir, state) = test_state();
    let app = histfig_core::web::create_router(state);

    let response =
        app.oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["model_ready"], true);
}

#[tokio::test]
async fn create_then_get_figure_round_trips() {
    let (_dir, state) = test_state();
    let app = histfig_core::web::create_router(state);

    let create_body = json!({
        "id": "napoleon",
        "name": "Napoleon",
        "description": "French emperor",
        "persona_prompt": "Speak imperiously.",
        "birth_year": 1769,
        "death_year": 1821
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/figures")
                .header("content-type", "application/json")
                .body(Body::from(create_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/figures/napoleon").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["name"], "Napoleon");
    assert_eq!(body["document_count"], 0);
}

#[tokio::test]
async fn search_on_empty_figure_returns_empty_list() {
    let (_dir, state) = test_state();
    state.store.create("napoleon", "Napoleon", "d", "p", None, None).unwrap();
    let app = histfig_core::web::create_router(state);

    let search_body = json!({ "query": "napoleon", "n_results": 5 });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/figures/napoleon/search")
                .header("content-type", "application/json")
                .body(Body::from(search_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn search_rejects_unknown_figure() {
    let (_dir, state) = test_state();
    let app = histfig_core::web::create_router(state);

    let search_body = json!({ "query": "napoleon" });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/figures/napoleon/search")
                .header("content-type", "application/json")
                .body(Body::from(search_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_figure_then_recreate_succeeds() {
    let (_dir, state) = test_state();
    state.store.create("napoleon", "Napoleon", "d", "p", None, None).unwrap();
    let app = histfig_core::web::create_router(state);

    let response = app
        .clone()
        .oneshot(Request::builder().method("DELETE").uri("/figures/napoleon").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(Request::builder().uri("/figures/napoleon").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
