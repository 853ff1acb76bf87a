//! # API REST
//!
//! REST API for the nimbus file store.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI documentation
//! - REST-specific concerns (multipart bodies, streaming, CORS, request tracing)
//!
//! The store itself is blocking; every handler runs its store call on the blocking thread pool.
//! Uses `api-shared` for wire types.

#![warn(rust_2018_idioms)]

mod bridge;
pub mod error;
mod handlers;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use nimbus_files::FileStore;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

pub use error::{ApiError, ApiResult};

/// Room left in the request body cap for multipart boundaries and part headers.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn FileStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::upload,
        handlers::upload_many,
        handlers::download,
        handlers::download_many,
        handlers::delete_file,
    ),
    components(schemas(
        api_shared::HealthRes,
        api_shared::UploadRes,
        api_shared::UploadManyRes,
        api_shared::DownloadManyReq,
        api_shared::ErrorRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router over `state`.
///
/// Request bodies are capped at the store's maximum upload size plus multipart overhead; the store
/// enforces the exact per-file limit itself.
pub fn router(state: AppState) -> Router {
    let max_upload = usize::try_from(state.store().config().max_upload_bytes()).unwrap_or(usize::MAX);
    let body_limit = max_upload.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/upload", post(handlers::upload))
        .route("/upload-many", post(handlers::upload_many))
        .route("/download", get(handlers::download))
        .route("/download-many", post(handlers::download_many))
        .route(
            "/delete",
            delete(handlers::delete_file).post(handlers::delete_file),
        )
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
