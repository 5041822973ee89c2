//! QR Art Server - веб-интерфейс генератора художественных QR
//!
//! - `GET /` - страница с формой
//! - `POST /generate` - синхронная генерация (классика или AI), HTML
//! - `POST /generate_ai` - фоновая AI задача, JSON `{task_id}`
//! - `GET /progress/{id}`, `POST /cancel/{id}` - состояние и отмена задачи
//! - `GET /health`

pub mod config;
pub mod error;
pub mod form;
pub mod page;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use qr_art_core::ArtEngine;
use tokio::sync::Semaphore;

pub use config::{ConfigError, ServerConfig};
pub use error::ServerError;
pub use state::{ResultCache, TaskSnapshot, TaskStatus, TaskStore};

/// Общее состояние обработчиков
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ArtEngine>,
    pub tasks: TaskStore,
    pub cache: Arc<ResultCache>,
    /// Ограничение одновременных генераций
    pub jobs: Arc<Semaphore>,
    pub task_ttl: Duration,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(engine: ArtEngine, config: &ServerConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            tasks: TaskStore::new(),
            cache: Arc::new(ResultCache::new(config.cache_capacity)),
            jobs: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            task_ttl: Duration::from_secs(config.task_ttl_secs),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

pub fn app(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(routes::index))
        .route("/generate", post(routes::generate))
        .route("/generate_ai", post(routes::generate_ai))
        .route("/progress/:task_id", get(routes::progress))
        .route("/cancel/:task_id", post(routes::cancel))
        .route("/health", get(routes::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
