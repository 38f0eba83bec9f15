//! The relay HTTP server.
//!
//! Six endpoints: create, validate, signal, close, an SSE listen stream,
//! and an authenticated cleanup hook. The relay stores opaque signaling
//! payloads
//! and can never read transferred file content; the only state it holds is
//! short-lived session records in memory.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Error;
use crate::session::{CoordinatorConfig, MemoryStore, SessionCoordinator, SessionEvent};

use super::protocol::{
    AckResponse, CleanupResponse, CloseRequest, CreateRequest, CreateResponse, ListenQuery,
    SessionSummary, SignalPayload, SignalRequest, ValidateRequest, ValidateResponse,
};

/// JSON error body.
#[derive(Debug, Serialize)]
struct ApiError {
    message: String,
    #[serde(skip)]
    status: StatusCode,
}

impl ApiError {
    fn from_error(error: &Error) -> Self {
        let status = match error {
            Error::InvalidTokenFormat(_) | Error::DescriptionFailed(_) => StatusCode::BAD_REQUEST,
            Error::TokenNotFound(_) => StatusCode::NOT_FOUND,
            Error::TokenExpired => StatusCode::GONE,
            Error::AnswerAlreadySet => StatusCode::CONFLICT,
            Error::FieldNotOwned { .. } => StatusCode::FORBIDDEN,
            Error::TokenGenerationExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            message: error.to_string(),
            status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self::from_error(&error)
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Shared server state.
#[derive(Clone)]
pub struct RelayState {
    /// Session rules live in the coordinator.
    pub coordinator: Arc<SessionCoordinator<MemoryStore>>,
    /// Bearer secret for the cleanup endpoint, if configured.
    pub cleanup_secret: Option<String>,
}

impl RelayState {
    /// Fresh in-memory state.
    #[must_use]
    pub fn new(cleanup_secret: Option<String>) -> Self {
        Self {
            coordinator: Arc::new(SessionCoordinator::new(MemoryStore::new())),
            cleanup_secret,
        }
    }

    /// Fresh in-memory state with explicit coordinator tunables.
    #[must_use]
    pub fn with_config(config: CoordinatorConfig, cleanup_secret: Option<String>) -> Self {
        Self {
            coordinator: Arc::new(SessionCoordinator::with_config(MemoryStore::new(), config)),
            cleanup_secret,
        }
    }
}

/// Build the relay router.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/api/create", post(create))
        .route("/api/validate", post(validate))
        .route("/api/signal", post(signal))
        .route("/api/close", post(close))
        .route("/api/listen", get(listen))
        .route("/api/cleanup", get(cleanup))
        .with_state(state)
}

/// Bind and serve until the task is cancelled.
pub async fn serve(addr: SocketAddr, state: RelayState) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "relay listening");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| Error::Relay(e.to_string()))
}

async fn create(
    State(state): State<RelayState>,
    Json(request): Json<CreateRequest>,
) -> ApiResult<Json<CreateResponse>> {
    let created = state
        .coordinator
        .create_session(request.offer, request.file)
        .await?;
    Ok(Json(CreateResponse {
        success: true,
        token: created.token.to_string(),
        expires_at: created.expires_at,
    }))
}

async fn validate(
    State(state): State<RelayState>,
    Json(request): Json<ValidateRequest>,
) -> Json<ValidateResponse> {
    match state.coordinator.validate_session(&request.token).await {
        Ok(session) => Json(ValidateResponse {
            valid: true,
            session: Some(SessionSummary {
                file: session.file,
                offer: session.sender.offer,
                status: session.status,
            }),
            error: None,
        }),
        Err(e) => Json(ValidateResponse {
            valid: false,
            session: None,
            error: Some(e.user_message()),
        }),
    }
}

async fn signal(
    State(state): State<RelayState>,
    Json(request): Json<SignalRequest>,
) -> ApiResult<Json<AckResponse>> {
    match request.payload {
        SignalPayload::Answer { answer } => {
            state
                .coordinator
                .submit_answer(&request.token, request.role, answer)
                .await?;
        }
        SignalPayload::Candidate { candidate } => {
            state
                .coordinator
                .submit_candidate(&request.token, request.role, candidate)
                .await?;
        }
    }
    Ok(Json(AckResponse { success: true }))
}

async fn close(
    State(state): State<RelayState>,
    Json(request): Json<CloseRequest>,
) -> ApiResult<Json<AckResponse>> {
    state.coordinator.close_session(&request.token).await?;
    Ok(Json(AckResponse { success: true }))
}

async fn listen(
    State(state): State<RelayState>,
    Query(query): Query<ListenQuery>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let stream = state
        .coordinator
        .subscribe(query.token, query.role)
        .map(|event: SessionEvent| {
            Ok(Event::default().json_data(&event).unwrap_or_else(|e| {
                warn!(%e, "failed to serialize session event");
                Event::default().comment("serialization error")
            }))
        });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn cleanup(
    State(state): State<RelayState>,
    headers: HeaderMap,
) -> ApiResult<Json<CleanupResponse>> {
    if let Some(secret) = &state.cleanup_secret {
        let authorized = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|bearer| bearer == secret);
        if !authorized {
            return Err(ApiError {
                message: "unauthorized".to_string(),
                status: StatusCode::UNAUTHORIZED,
            });
        }
    }
    let deleted = state.coordinator.sweep_expired().await?;
    Ok(Json(CleanupResponse {
        success: true,
        deleted,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_mapping() {
        assert_eq!(
            ApiError::from_error(&Error::TokenNotFound("x".into())).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from_error(&Error::TokenExpired).status,
            StatusCode::GONE
        );
        assert_eq!(
            ApiError::from_error(&Error::AnswerAlreadySet).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from_error(&Error::FieldNotOwned {
                role: "sender",
                field: "answer"
            })
            .status,
            StatusCode::FORBIDDEN
        );
    }
}
