//! HTTP endpoint handlers

use std::sync::Arc;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
};
use tracing::{error, info, warn};

use crate::{
    services::PointEntry,
    state::{AppState, StartOutcome, StoppedSession},
};
use super::responses::{
    HealthResponse, LogSessionRequest, ProjectsResponse, StartRequest, StatusResponse,
    TimerResponse,
};

/// Handle GET /timer - Current timer snapshot and server status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (last_action, last_action_time) = state.get_last_action();

    Json(StatusResponse {
        timer: state.engine.snapshot(),
        stopped_session: state.engine.stopped_session(),
        max_duration_seconds: state.engine.max_duration().as_secs(),
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    })
}

/// Handle POST /timer/start - Start timing a known project
pub async fn start_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> Result<Json<TimerResponse>, StatusCode> {
    if !state.projects.contains(&request.project_id) {
        warn!("Start requested for unknown project {}", request.project_id);
        return Err(StatusCode::NOT_FOUND);
    }

    let outcome = state.start_timer(
        &request.project_id,
        request.task_id,
        request.task_description,
    );
    match outcome {
        StartOutcome::Started => {
            info!("Start endpoint called - timing project {}", request.project_id);
            Ok(Json(TimerResponse::started(outcome, state.engine.snapshot())))
        }
        StartOutcome::AlreadyRunning | StartOutcome::SessionPending => {
            info!("Start endpoint called - refused ({:?})", outcome);
            Err(StatusCode::CONFLICT)
        }
        StartOutcome::StoreUnavailable => {
            error!("Start endpoint called - timer storage unavailable");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// Handle POST /timer/stop - Stop the timer and return the finished session
pub async fn stop_handler(State(state): State<Arc<AppState>>) -> Json<TimerResponse> {
    let session = state.stop_timer();
    info!("Stop endpoint called - session produced: {}", session.is_some());
    Json(TimerResponse::stopped(state.engine.snapshot(), session))
}

/// Handle GET /timer/stopped - The session waiting to be logged
pub async fn stopped_session_handler(
    State(state): State<Arc<AppState>>,
) -> Json<Option<StoppedSession>> {
    Json(state.engine.stopped_session())
}

/// Handle DELETE /timer/stopped - Discard the pending session
pub async fn clear_stopped_session_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    state.engine.clear_stopped_session();
    state.record_action("discard");
    StatusCode::NO_CONTENT
}

/// Handle POST /timer/stopped/log - Log the pending session as a point entry
pub async fn log_stopped_session_handler(
    State(state): State<Arc<AppState>>,
    request: Result<Json<LogSessionRequest>, JsonRejection>,
) -> Result<Json<PointEntry>, StatusCode> {
    let request = match request {
        Ok(Json(request)) => request,
        // No JSON body at all means "use the defaults"
        Err(JsonRejection::MissingJsonContentType(_)) => LogSessionRequest::default(),
        Err(e) => {
            warn!("Log endpoint called with an invalid body: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };
    if !request.is_valid() {
        warn!(
            "Log endpoint called with invalid amounts (points={:?}, hours={:?})",
            request.points, request.hours
        );
        return Err(StatusCode::BAD_REQUEST);
    }

    match state.log_stopped_session(request.points, request.hours) {
        Ok(Some(entry)) => Ok(Json(entry)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("{}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle GET /points - Logged point entries
pub async fn points_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PointEntry>>, StatusCode> {
    match state.point_log.entries() {
        Ok(entries) => Ok(Json(entries)),
        Err(e) => {
            error!("Failed to read point entries: {:#}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle GET /projects - Registry membership
pub async fn projects_handler(State(state): State<Arc<AppState>>) -> Json<ProjectsResponse> {
    Json(ProjectsResponse {
        projects: state.projects.projects(),
    })
}

/// Handle PUT /projects/:project_id - Register a project
pub async fn add_project_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> StatusCode {
    if state.projects.add(&project_id) {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

/// Handle DELETE /projects/:project_id - Remove a project, stopping its timer
pub async fn remove_project_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> StatusCode {
    if state.projects.remove(&project_id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
