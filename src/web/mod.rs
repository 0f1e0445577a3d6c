//! HTTP/SSE surface (spec §6) — a thin Axum shell around the figure store,
//! hybrid search engine, and document processor. No retrieval logic lives
//! in this module; every handler just extracts request data, calls into
//! the library, and maps the result to a response.
//!
//! | Route | Method | Purpose |
//! |---|---|---|
//! | `/healthz` | GET | liveness probe (ambient, not a spec contract) |
//! | `/figures` | GET, POST | list / create figures |
//! | `/figures/{id}` | GET, PATCH, DELETE | figure CRUD |
//! | `/figures/{id}/documents` | POST | multipart ingestion, progress over `/events` |
//! | `/figures/{id}/documents` | DELETE | clear a figure's documents |
//! | `/figures/{id}/search` | POST | hybrid search |
//! | `/events` | GET | SSE ingestion progress stream |
//! | `/static/figure_images/*` | GET | portrait images (spec §6 on-disk layout) |

pub mod events;
pub mod handlers;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use state::AppState;

pub fn create_router(state: AppState) -> Router {
    let max_request_size = state.config.max_request_size_bytes as usize;
    let images_dir = state.config.figure_images_dir.clone();

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/events", get(handlers::sse_events))
        .route("/figures", get(handlers::list_figures).post(handlers::create_figure))
        .route(
            "/figures/{id}",
            get(handlers::get_figure).patch(handlers::update_figure).delete(handlers::delete_figure),
        )
        .route(
            "/figures/{id}/documents",
            post(handlers::upload_documents).delete(handlers::clear_figure_documents),
        )
        .route("/figures/{id}/search", post(handlers::search_figure))
        .nest_service("/static/figure_images", ServeDir::new(images_dir))
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
