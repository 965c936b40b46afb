//! HTTP API module
//!
//! This module contains all HTTP endpoint handlers and response structures.

pub mod handlers;
pub mod responses;

use std::sync::Arc;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use handlers::*;

/// Create the HTTP router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/timer", get(status_handler))
        .route("/timer/start", post(start_handler))
        .route("/timer/stop", post(stop_handler))
        .route(
            "/timer/stopped",
            get(stopped_session_handler).delete(clear_stopped_session_handler),
        )
        .route("/timer/stopped/log", post(log_stopped_session_handler))
        .route("/points", get(points_handler))
        .route("/projects", get(projects_handler))
        .route(
            "/projects/:project_id",
            put(add_project_handler).delete(remove_project_handler),
        )
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
