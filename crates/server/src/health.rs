use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use leadgate_agent::Orchestrator;
use serde::Serialize;

pub const BANNER: &str = "Sistemas de Evangelista & Co. operativos";

#[derive(Clone)]
pub struct HealthState {
    orchestrator: Arc<Orchestrator>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    /// `live` or `stub`.
    pub inference: &'static str,
    pub lead_log: &'static str,
    pub checked_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Banner {
    pub status: &'static str,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .with_state(HealthState { orchestrator })
}

pub async fn banner() -> Json<Banner> {
    Json(Banner { status: BANNER })
}

// Stub mode is still "ok": the endpoints answer, just with degraded replies.
pub async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "leadgate-server",
        inference: if state.orchestrator.inference_live() { "live" } else { "stub" },
        lead_log: state.orchestrator.recorder().backend(),
        checked_at: Utc::now().to_rfc3339(),
    })
}
