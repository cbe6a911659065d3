//! HTTP bridge for browser frontends.
//!
//! Endpoints:
//! - POST /send      `{"message": "..."}` publishes to the joined room
//! - GET  /messages  every logged line as a JSON array of strings
//!
//! CORS is open to every origin. There is no authentication; the bridge
//! is meant to be bound to a trusted interface.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use alertmesh_network::RoomPublisher;
use alertmesh_protocol::message::log_line;
use alertmesh_types::{AlertmeshError, Result};

use crate::message_log::MessageLog;

/// Nickname under which the node's own messages are logged.
pub const SELF_NICK: &str = "You";

/// Shared state for all handlers.
pub struct HttpState {
    pub log: MessageLog,
    pub publisher: RoomPublisher,
}

pub fn build_router(state: Arc<HttpState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/send", post(handle_send))
        .route("/messages", get(handle_messages))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------- Data types ----------

#[derive(Deserialize)]
struct SendRequest {
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

// ---------- Handlers ----------

async fn handle_send(State(state): State<Arc<HttpState>>, body: Bytes) -> Response {
    let request: SendRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(%e, "rejecting undecodable send request");
            return error_response(StatusCode::BAD_REQUEST, "failed to decode");
        }
    };
    if request.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message must not be empty");
    }

    // Recorded even if the publish below fails.
    if let Err(e) = state
        .log
        .append(log_line(&Local::now(), SELF_NICK, &request.message))
    {
        tracing::warn!(%e, "failed to record sent message");
    }

    match state.publisher.publish(&request.message).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::warn!(%e, "publish from HTTP bridge failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("failed to publish: {e}"))
        }
    }
}

async fn handle_messages(State(state): State<Arc<HttpState>>) -> Response {
    match state.log.snapshot() {
        Ok(lines) => Json(lines).into_response(),
        Err(e) => {
            tracing::error!(%e, "message log unavailable");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ---------- Server ----------

/// Binds the HTTP listener.
///
/// # Errors
///
/// Returns [`AlertmeshError::NetworkError`] if the address is taken.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| AlertmeshError::NetworkError {
            reason: format!("failed to bind HTTP bridge on {addr}: {e}"),
        })
}

/// Serves the bridge until shutdown is signalled, then drains in-flight
/// requests.
pub async fn serve(
    listener: TcpListener,
    state: Arc<HttpState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP bridge listening");
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .map_err(|e| AlertmeshError::NetworkError {
            reason: format!("HTTP bridge failed: {e}"),
        })?;

    tracing::info!("HTTP bridge stopped");
    Ok(())
}
