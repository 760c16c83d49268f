//! HTTP gateway.
//!
//! Routes:
//! - `POST /api/chat/stream` — run one turn, streaming agent events as SSE
//! - `GET /api/chat/sessions` — session index for the calling user
//! - `GET /api/chat/session/:id/history` — user/assistant transcript
//! - `DELETE /api/chat/session/:id` — drop a session and its checkpoint
//! - `POST /api/chat/session/:id/cancel` — flag the in-flight turn
//! - `GET /health` — liveness check
//!
//! Identity comes from the `x-user-id` header; absent means "anonymous".
//! Full auth (cookies, OAuth flows) sits in front of this service.

use crate::types::{
    sse_payload, ChatRequest, HistoryEntry, HistoryResponse, SessionsResponse, StatusResponse,
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use futures_util::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use uuid::Uuid;
use wayfinder_agent::orchestrator::{Orchestrator, TurnRequest};
use wayfinder_agent::registry::ToolContext;
use wayfinder_agent::AgentEvent;
use wayfinder_core::{CheckpointStore, Role, TurnError};

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    checkpoints: Arc<dyn CheckpointStore>,
}

pub struct GatewayServer {
    orchestrator: Arc<Orchestrator>,
    checkpoints: Arc<dyn CheckpointStore>,
    host: String,
    port: u16,
}

impl GatewayServer {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        checkpoints: Arc<dyn CheckpointStore>,
        host: &str,
        port: u16,
    ) -> Self {
        Self {
            orchestrator,
            checkpoints,
            host: host.to_string(),
            port,
        }
    }

    /// Start the server. Spawns a background task and returns its handle.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let app = app(self.orchestrator, self.checkpoints);
        let addr = format!("{}:{}", self.host, self.port);

        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(&addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!("Gateway failed to bind {}: {}", addr, e);
                    return;
                }
            };
            tracing::info!("Gateway listening on {}", addr);
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Gateway server error: {}", e);
            }
        })
    }
}

/// Build the gateway router. Separate from `start` so tests can drive the
/// routes without binding a socket.
pub fn app(orchestrator: Arc<Orchestrator>, checkpoints: Arc<dyn CheckpointStore>) -> Router {
    router(AppState {
        orchestrator,
        checkpoints,
    })
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/chat/sessions", get(list_sessions))
        .route("/api/chat/session/:id/history", get(session_history))
        .route("/api/chat/session/:id", delete(delete_session))
        .route("/api/chat/session/:id/cancel", post(cancel_turn))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Route handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

fn user_id_from(headers: &HeaderMap) -> String {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

/// A requested session id that belongs to another user gets a fresh id
/// instead of an error, so a stale or guessed id can never append to (or
/// read) someone else's thread.
async fn resolve_session_id(
    checkpoints: &Arc<dyn CheckpointStore>,
    requested: Option<String>,
    user_id: &str,
) -> Result<String, StatusCode> {
    let session_id = requested.unwrap_or_else(|| Uuid::new_v4().to_string());
    let exists = checkpoints
        .session_exists(&session_id)
        .await
        .map_err(internal_error)?;
    if !exists {
        return Ok(session_id);
    }
    let owned = checkpoints
        .session_owned_by(&session_id, user_id)
        .await
        .map_err(internal_error)?;
    if owned {
        Ok(session_id)
    } else {
        Ok(Uuid::new_v4().to_string())
    }
}

async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let user_id = user_id_from(&headers);
    let session_id =
        resolve_session_id(&state.checkpoints, request.session_id.clone(), &user_id).await?;

    let turn = TurnRequest {
        thread_id: session_id.clone(),
        user_id,
        message: request.message,
        credentials: ToolContext {
            google_token: request.google_token,
        },
    };

    let (tx, rx) = mpsc::channel::<AgentEvent>(64);
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let result = orchestrator.run_turn(turn, tx.clone()).await;
        // A busy rejection happens before the turn's event stream starts, so
        // it is the one failure with no terminal event emitted yet.
        if let Err(e @ TurnError::SessionBusy(_)) = &result {
            let _ = tx
                .send(AgentEvent::Error {
                    message: e.user_message(),
                })
                .await;
        }
        if let Err(e) = result {
            tracing::warn!("Turn for session {} failed: {}", session_id, e);
        }
    });

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let frame = Event::default()
            .event(event.wire_name())
            .data(sse_payload(&event).to_string());
        Some((Ok(frame), rx))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionsResponse>, StatusCode> {
    let user_id = user_id_from(&headers);
    let sessions = state
        .checkpoints
        .list_sessions(&user_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(SessionsResponse { sessions }))
}

async fn session_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    let user_id = user_id_from(&headers);
    let owned = state
        .checkpoints
        .session_owned_by(&session_id, &user_id)
        .await
        .map_err(internal_error)?;
    if !owned {
        return Err(StatusCode::NOT_FOUND);
    }

    let messages = state
        .checkpoints
        .load(&session_id)
        .await
        .map_err(internal_error)?;
    // Tool messages and tool-call scaffolding stay internal; the client sees
    // the user/assistant transcript only.
    let history = messages
        .iter()
        .filter_map(|msg| {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => return None,
            };
            Some(HistoryEntry {
                role: role.to_string(),
                content: msg.text().to_string(),
            })
        })
        .collect();

    Ok(Json(HistoryResponse {
        session_id,
        history,
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let user_id = user_id_from(&headers);
    // Deleting an id that was never seen succeeds (idempotent); an id owned
    // by someone else is indistinguishable from a missing one.
    let exists = state
        .checkpoints
        .session_exists(&session_id)
        .await
        .map_err(internal_error)?;
    if exists {
        let owned = state
            .checkpoints
            .session_owned_by(&session_id, &user_id)
            .await
            .map_err(internal_error)?;
        if !owned {
            return Err(StatusCode::NOT_FOUND);
        }
        state
            .checkpoints
            .delete_session(&session_id)
            .await
            .map_err(internal_error)?;
    }
    Ok(Json(StatusResponse {
        status: "deleted",
        session_id,
    }))
}

async fn cancel_turn(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let user_id = user_id_from(&headers);
    let owned = state
        .checkpoints
        .session_owned_by(&session_id, &user_id)
        .await
        .map_err(internal_error)?;
    if !owned {
        return Err(StatusCode::NOT_FOUND);
    }

    // Cancelling an idle session is a no-op, not an error.
    let status = if state.orchestrator.cancel(&session_id) {
        "cancelling"
    } else {
        "idle"
    };
    Ok(Json(StatusResponse { status, session_id }))
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    tracing::error!("Gateway store error: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}
