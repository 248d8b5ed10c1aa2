//! DermaCare HTTP API
//!
//! Authentication, image prediction, prediction and chat history, and skin
//! analysis over a shared [`AppState`]. The classifier is loaded once at
//! startup and shared by every request.

pub mod analysis;
pub mod auth;
pub mod config;
pub mod error;
pub mod google;
pub mod routes;
pub mod state;
pub mod store;
pub mod upload;

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::{ApiError, ApiResult};
pub use state::{AppState, SharedState};

/// Build the application router over `state`
pub fn router(state: SharedState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .merge(routes::health::routes())
        .merge(routes::auth::routes())
        .merge(routes::profile::routes())
        .merge(routes::predict::routes())
        .merge(routes::history::routes())
        .merge(routes::chat::routes())
        .merge(routes::analysis::routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
