use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::SharedState;

pub fn routes() -> Router<SharedState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct ModelStatus {
    pub classes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub version: &'static str,
    pub model: ModelStatus,
}

#[tracing::instrument(name = "GET /health", skip(state))]
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let classes = state.predictor().codec().classes().to_vec();
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION"),
        model: ModelStatus { classes },
    })
}
