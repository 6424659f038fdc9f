use crate::middleware::cors_middleware;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware as axum_mw,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream, StreamExt};
use parley_agent::{AgentRunner, Orchestration};
use parley_core::frame::{encode, DONE_FRAME};
use parley_core::ParleyError;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info, warn};

const INVALID_REQUEST: &str = "Invalid request. 'query' field is required and must be a string.";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Shared by every request.
    pub runner: Arc<AgentRunner>,
}

/// The HTTP gateway.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the router with the chat and health endpoints behind CORS.
    pub fn build(runner: Arc<AgentRunner>) -> Router {
        let state = AppState { runner };

        Router::new()
            .route("/chat", post(chat_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(axum_mw::from_fn(cors_middleware))
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "parley",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Extracts the query from a raw body. Any shape problem yields `None`.
fn parse_query(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let query = value.get("query")?.as_str()?;
    (!query.trim().is_empty()).then(|| query.to_string())
}

fn bad_request() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": INVALID_REQUEST })),
    )
        .into_response()
}

async fn chat_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(query) = parse_query(&body) else {
        warn!(body_len = body.len(), "Rejected chat request");
        return bad_request();
    };

    match state.runner.run(&query) {
        Ok(orchestration) => event_stream_response(orchestration),
        Err(ParleyError::Validation(_)) => bad_request(),
        Err(e) => {
            error!(error = %e, "Failed to start query");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Streams the orchestration's events as frames, then the terminal marker.
///
/// The body owns the orchestration: when the client goes away the body is
/// dropped and the in-flight work with it.
fn event_stream_response(orchestration: Orchestration) -> Response {
    let frames = orchestration
        .into_stream()
        .filter_map(|event| async move {
            match encode(&event) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    warn!(error = %e, kind = event.kind(), "Skipping event that failed to encode");
                    None
                }
            }
        })
        .chain(stream::once(async {
            info!("Event stream complete");
            DONE_FRAME.to_string()
        }))
        .map(Ok::<_, Infallible>);

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream")),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::CONNECTION, HeaderValue::from_static("keep-alive")),
            (
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            ),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}
