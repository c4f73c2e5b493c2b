use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use contracts::{
    ApiError, ErrorCode, GeoPoint, SimulationConfig, StreamEvent, ThresholdUpdate,
    SCHEMA_VERSION_V1,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hub::{Frame, Registration, SUBSCRIBER_BUFFER};
use crate::scheduler::Scheduler;
use crate::sources::SourceError;
use crate::state::AppState;

const SERVICE_NAME: &str = "Crowd Safety Intelligence System";
const DEFAULT_NEARBY_RADIUS_DEG: f64 = 0.05;
const DEFAULT_REPORT_PERIOD: &str = "1hour";
const WRITER_DRAIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

include!("error.rs");
include!("routes/control.rs");
include!("routes/query.rs");
include!("routes/insights.rs");
include!("routes/stream.rs");
include!("util.rs");

/// Runs producers and the HTTP surface until Ctrl-C, then stops both.
pub async fn serve(addr: SocketAddr, config: SimulationConfig) -> Result<(), ServerError> {
    let state = AppState::new(config)?;
    let scheduler = Scheduler::spawn(state.clone());
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "server.listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/ws", get(stream_subscribe))
        .route("/api/status", get(get_status))
        .route("/api/history", get(get_history))
        .route("/api/charts", get(get_charts))
        .route("/api/export", get(get_export))
        .route("/api/settings", get(get_settings))
        .route("/api/settings/thresholds", post(update_thresholds))
        .route("/api/control/pause", post(pause_simulation))
        .route("/api/control/resume", post(resume_simulation))
        .route("/api/control/toggle", post(toggle_simulation))
        .route("/api/control/speed", post(set_speed))
        .route("/api/control/demo-mode", post(toggle_demo_mode))
        .route("/api/control/reset-history", post(reset_history))
        .route("/api/control/reset-stats", post(reset_stats))
        .route("/api/ai/insights", post(crowd_insights))
        .route("/api/ai/action-plan", post(action_plan))
        .route("/api/ai/report", get(incident_report))
        .route("/api/responders/nearby", get(nearby_responders))
        .layer(middleware::from_fn_with_state(state.clone(), cors_middleware))
        .with_state(state)
}

async fn cors_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut(), &state.config.frontend_origin);
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut(), &state.config.frontend_origin);
    response
}

#[cfg(test)]
mod tests;
