use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::state::SharedState;

pub fn routes() -> Router<SharedState> {
    Router::new().route("/profile", get(profile))
}

#[derive(Debug, Serialize)]
pub struct ProfileUser {
    pub username: String,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: ProfileUser,
}

#[tracing::instrument(name = "GET /profile", skip_all)]
pub async fn profile(AuthUser(user): AuthUser) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        user: ProfileUser {
            username: user.username,
            email: user.email,
            created_at: user.created_at.to_rfc3339(),
        },
    })
}
