use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use leadgate_agent::{ConversationTurn, Orchestrator, TurnRequest};
use leadgate_core::{AuditSignal, InterfaceError, LeadMemory};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatState {
    orchestrator: Arc<Orchestrator>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Option<Vec<ConversationTurn>>,
    #[serde(default)]
    pub lead_data: Option<LeadMemory>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub silent_audit: AuditSignal,
    pub updated_lead_data: LeadMemory,
}

#[derive(Clone, Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        };
        let body = ErrorBody {
            error: self.0.user_message(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new().route("/chat", post(chat)).with_state(ChatState { orchestrator })
}

pub async fn chat(
    State(state): State<ChatState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    let Json(request) = payload.map_err(|rejection| {
        warn!(
            event_name = "http.chat.rejected",
            correlation_id = %correlation_id,
            error = %rejection.body_text(),
            "chat request body could not be decoded"
        );
        ApiError(InterfaceError::bad_request(rejection.body_text(), &correlation_id))
    })?;

    if request.message.trim().is_empty() {
        warn!(
            event_name = "http.chat.rejected",
            correlation_id = %correlation_id,
            error = "blank message",
            "chat request carried no message"
        );
        return Err(ApiError(InterfaceError::bad_request(
            "message must not be blank",
            &correlation_id,
        )));
    }

    let history = request.history.unwrap_or_default();
    info!(
        event_name = "http.chat.received",
        correlation_id = %correlation_id,
        history_turns = history.len(),
        "chat turn received"
    );

    let outcome = state
        .orchestrator
        .handle(TurnRequest {
            message: request.message,
            history,
            memory: request.lead_data.unwrap_or_default(),
            correlation_id,
        })
        .await;

    Ok(Json(ChatResponse {
        response: outcome.reply,
        silent_audit: outcome.signal,
        updated_lead_data: outcome.memory,
    }))
}
