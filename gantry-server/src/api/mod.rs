//! API Module
//!
//! HTTP surface of the server: pipeline submission and polling.

pub mod error;
pub mod health;
pub mod pipeline;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::store::PipelineStore;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PipelineStore>,
}

/// Create the main API router with all endpoints
pub fn create_router(store: Arc<dyn PipelineStore>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/run-pipeline", post(pipeline::run_pipeline))
        .route("/pipeline/{id}/status", get(pipeline::pipeline_status))
        .route("/pipeline/{id}/logs", get(pipeline::pipeline_logs))
        // Add state and middleware
        .with_state(AppState { store })
        .layer(TraceLayer::new_for_http())
}
