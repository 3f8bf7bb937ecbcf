//! csvhub API Library
//!
//! Catalog service and HTTP surface for csvhub: upload CSV files, list and
//! fetch them, and join them against records from external APIs.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod service;
pub mod tracker;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use config::ServerConfig;
pub use error::{ApiError, ErrorResponse};
pub use service::{CatalogService, ExportedFile, JoinOutcome, UploadOutcome};
pub use tracker::{JoinTask, JoinTracker, TaskStatus};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CatalogService>,
}

impl AppState {
    pub fn new(service: CatalogService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Build the HTTP router. Every `/csvfile` path also answers with a trailing slash.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    use handlers::*;

    let router = Router::new()
        .route("/health", get(health::health_check))
        .route("/live", get(health::liveness_check))
        .route("/ready", get(health::readiness_check))
        .route("/csvfile", get(list_files).post(upload_file))
        .route("/csvfile/", get(list_files).post(upload_file))
        .route("/csvfile/:id", get(get_file))
        .route("/csvfile/:id/", get(get_file))
        .route("/csvfile/:id/meta", get(get_file_meta))
        .route("/csvfile/:id/download", get(download_file))
        .route("/csvfile/:id/join", post(join_file))
        .route("/csvfile/:id/join/", post(join_file))
        .route("/task-status/:task_id", get(task_status));

    #[cfg(feature = "metrics")]
    let router = router
        .route("/metrics", get(metrics::metrics_handler))
        .layer(axum::middleware::from_fn(metrics::track_requests));

    router
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
