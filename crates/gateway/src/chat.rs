//! `POST /api/chat`: one orchestration run per request.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use todoclaw_agent::RunError;
use todoclaw_core::credential::Credential;
use todoclaw_core::message::HistoryTurn;
use tracing::{info, warn};

use crate::SharedState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryTurn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Boundary failures. Bodies are generic; details go to the log only.
#[derive(Debug)]
pub enum ChatError {
    MissingCredential,
    EmptyMessage,
    ToolsUnavailable,
    ModelUnavailable,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ChatError::MissingCredential => (
                StatusCode::UNAUTHORIZED,
                "Missing or invalid Authorization header",
            ),
            ChatError::EmptyMessage => (StatusCode::BAD_REQUEST, "Message must not be empty"),
            ChatError::ToolsUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "The todo assistant is temporarily unavailable. Please try again.",
            ),
            ChatError::ModelUnavailable => (
                StatusCode::BAD_GATEWAY,
                "The todo assistant could not reach its language model. Please try again.",
            ),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<RunError> for ChatError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::Channel(_) => ChatError::ToolsUnavailable,
            RunError::Provider(_) => ChatError::ModelUnavailable,
        }
    }
}

/// The bearer token from an `Authorization` header, if well-formed.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub async fn chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ChatError> {
    let token = bearer_token(&headers).ok_or(ChatError::MissingCredential)?;
    if request.message.trim().is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    let credential = Credential::new(token, &state.upstream_base_url);

    match state
        .orchestrator
        .run(credential, &request.conversation_history, &request.message)
        .await
    {
        Ok(outcome) => {
            info!(
                run_id = %outcome.run_id,
                finished = outcome.is_finished(),
                tool_calls = outcome.tool_calls,
                "Chat request answered"
            );
            Ok(Json(ChatResponse {
                response: outcome.response,
            }))
        }
        Err(e) => {
            warn!(error = %e, "Chat request failed");
            Err(e.into())
        }
    }
}
