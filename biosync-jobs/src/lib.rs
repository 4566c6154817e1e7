//! biosync-jobs library interface
//!
//! Exposes the job services and HTTP router for the binary and for
//! integration testing.

pub mod api;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::services::{AnalysisInvoker, CorrelationCoordinator, JobStore, ResultGateway, SignalEngine};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub invoker: AnalysisInvoker,
    pub coordinator: CorrelationCoordinator,
    pub gateway: ResultGateway,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last job failure, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        store: Arc<JobStore>,
        engine: Arc<dyn SignalEngine>,
        allowed_extensions: Vec<String>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            invoker: AnalysisInvoker::new(store.clone(), engine.clone(), allowed_extensions),
            coordinator: CorrelationCoordinator::new(store.clone(), engine),
            gateway: ResultGateway::new(store),
            max_upload_bytes,
            startup_time: biosync_common::time::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember a failure for the health endpoint
    pub async fn record_failure(&self, context: &str, err: &(dyn Display + Sync)) {
        *self.last_error.write().await = Some(format!("{}: {}", context, err));
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .merge(api::analysis_routes())
        .merge(api::correlation_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
