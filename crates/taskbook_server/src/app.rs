//! Router assembly and shared state.

use crate::handlers;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use taskbook_core::FsArtifactStore;
use tower_http::cors::{Any, CorsLayer};

/// Largest accepted request body, multipart uploads included.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared application state.
///
/// Handlers open their own SQLite connection per request.
pub struct AppState {
    pub db_path: PathBuf,
    pub store: FsArtifactStore,
}

impl AppState {
    pub fn new(db_path: impl Into<PathBuf>, store: FsArtifactStore) -> Self {
        Self {
            db_path: db_path.into(),
            store,
        }
    }
}

/// Builds the `/api/task` router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let task_routes = Router::new()
        .route("/upload", post(handlers::upload))
        .route("/submit", post(handlers::submit))
        .route("/info", get(handlers::info))
        .route("/list", get(handlers::list))
        .route("/review", post(handlers::review))
        .route("/delete-file", post(handlers::delete_file))
        .route("/delete", delete(handlers::reset))
        .route("/download/{task_id}", get(handlers::download));

    Router::new()
        .nest("/api/task", task_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}
