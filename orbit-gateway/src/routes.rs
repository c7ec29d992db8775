//! Route definitions for the ORBIT gateway.
//!
//! Provides the chat, health, and session-clear endpoints.

use crate::chat::ChatService;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use orbit_common::logging::generate_trace_id;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::Instrument;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
}

impl AppState {
    pub fn new(chat: ChatService) -> Self {
        Self { chat }
    }
}

/// Chat request body.
#[derive(Debug, Default, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "sessionId", deserialize_with = "session_key")]
    pub session_id: Option<String>,
}

/// Chat response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub timestamp: String,
}

/// Clear-session request body.
#[derive(Debug, Default, Deserialize)]
pub struct ClearSessionBody {
    #[serde(default, rename = "sessionId", deserialize_with = "session_key")]
    pub session_id: Option<String>,
}

/// Accept any scalar as a session identifier.
///
/// Strings are used as-is; numbers and booleans use their JSON text, so
/// `123` and `"123"` name the same session. `null` means no identifier.
fn session_key<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct SessionKeyVisitor;

    impl<'de> Visitor<'de> for SessionKeyVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string, number, boolean, or null session id")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(SessionKeyVisitor)
}

/// Clear-session response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClearSessionResponse {
    pub success: bool,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// ISO-8601 UTC with millisecond precision, e.g. `2024-05-01T12:00:00.000Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build the API routes over the given state.
pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/clear-session", post(clear_session_handler))
        .with_state(state)
        .merge(health_routes())
}

/// Build health check routes.
pub fn health_routes() -> Router {
    Router::new().route("/api/health", get(health_handler))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Forward one message to the model and return its reply.
async fn chat_handler(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let body = match body {
        Ok(Json(body)) => body,
        // A request without a JSON content type carries no fields at all.
        Err(JsonRejection::MissingJsonContentType(_)) => ChatBody::default(),
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "Rejected chat body");
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Invalid request body".into(),
                    details: Some(rejection.body_text()),
                }),
            ));
        }
    };

    let message = body.message.unwrap_or_default();
    let session_id = body.session_id.unwrap_or_default();

    let span = tracing::info_span!(
        "chat_exchange",
        trace_id = %generate_trace_id(),
        session_id = %session_id
    );

    async move {
        tracing::info!(message_len = message.len(), "Chat request received");

        match state.chat.exchange(&session_id, &message).await {
            Ok(outcome) => Ok(Json(ChatReply {
                response: outcome.response,
                timestamp: iso_timestamp(outcome.timestamp),
            })),
            Err(e) if e.is_invalid_input() => Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Message is required".into(),
                    details: None,
                }),
            )),
            Err(e) => {
                let details = match e {
                    orbit_common::Error::External(detail) => detail,
                    other => other.to_string(),
                };
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Failed to process request".into(),
                        details: Some(details),
                    }),
                ))
            }
        }
    }
    .instrument(span)
    .await
}

/// Health check handler.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "operational".into(),
        timestamp: iso_timestamp(Utc::now()),
    })
}

/// Remove a session's history. Reports success whether or not it existed.
async fn clear_session_handler(
    State(state): State<AppState>,
    body: Option<Json<ClearSessionBody>>,
) -> Json<ClearSessionResponse> {
    let session_id = body
        .and_then(|Json(body)| body.session_id)
        .unwrap_or_default();

    state.chat.clear_session(&session_id);

    Json(ClearSessionResponse { success: true })
}
