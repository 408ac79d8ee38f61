//! HTTP surface for the task document workflow.
//!
//! # Responsibility
//! - Translate `/api/task` requests into `taskbook_core` workflow calls.
//! - Own process bootstrap: schema migration, optional demo seed, listener.

pub mod app;
pub mod config;
mod error;
mod handlers;

pub use app::{router, AppState, MAX_BODY_BYTES};
pub use config::{Cli, ServerConfig};
pub use error::ApiError;

use log::info;
use std::sync::Arc;
use taskbook_core::db::{open_db, seed_demo_data};
use taskbook_core::FsArtifactStore;
use tokio::net::TcpListener;

/// Migrates the database, seeds it when requested and opens the upload store.
///
/// # Errors
/// Returns a human-readable message when the database or upload directory
/// cannot be prepared.
pub fn prepare_state(config: &ServerConfig) -> Result<Arc<AppState>, String> {
    let mut conn = open_db(&config.db_path)
        .map_err(|err| format!("cannot open database {}: {err}", config.db_path.display()))?;
    if config.seed_demo {
        match seed_demo_data(&mut conn).map_err(|err| format!("demo seed failed: {err}"))? {
            Some(seed) => info!(
                "event=server_seed module=server status=ok project_id={}",
                seed.project_id
            ),
            None => info!("event=server_seed module=server status=skipped reason=users_present"),
        }
    }
    drop(conn);

    let store = FsArtifactStore::open(&config.upload_dir).map_err(|err| {
        format!(
            "cannot open upload directory {}: {err}",
            config.upload_dir.display()
        )
    })?;
    Ok(Arc::new(AppState::new(config.db_path.clone(), store)))
}

/// Binds `config.bind` and serves until the listener fails.
pub async fn serve(config: ServerConfig) -> Result<(), String> {
    let state = prepare_state(&config)?;
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|err| format!("cannot bind {}: {err}", config.bind))?;
    info!(
        "event=server_start module=server status=ok bind={} version={}",
        config.bind,
        taskbook_core::core_version()
    );
    axum::serve(listener, router(state))
        .await
        .map_err(|err| format!("server error: {err}"))
}
