//! Registration, password login and Google sign-in

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{hash_password, verify_password};
use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use crate::store::{AuthProvider, User};

const MISSING_FIELDS: &str = "Missing fields!";
const INVALID_CREDENTIALS: &str = "Invalid credentials!";

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/auth/google", post(google_sign_in))
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GoogleSignInRequest {
    #[serde(rename = "idToken")]
    pub id_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub email: String,
}

/// Some(non-empty) or None
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[tracing::instrument(name = "POST /register", skip_all)]
pub async fn register(
    State(state): State<SharedState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(req) = body.map_err(|_| ApiError::bad_request(MISSING_FIELDS))?;
    let (Some(username), Some(email), Some(password)) = (
        present(req.username),
        present(req.email),
        present(req.password),
    ) else {
        return Err(ApiError::bad_request(MISSING_FIELDS));
    };

    let user = User {
        id: Uuid::new_v4(),
        username,
        email,
        password_hash: Some(hash_password(&password)?),
        google_id: None,
        profile_picture: None,
        auth_provider: AuthProvider::Password,
        created_at: Utc::now(),
        last_login: None,
    };
    let email = user.email.clone();
    state.store.insert_user(user).await?;

    info!("Registered {}", email);
    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "User registered successfully!"})),
    ))
}

#[tracing::instrument(name = "POST /login", skip_all)]
pub async fn login(
    State(state): State<SharedState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(req) = body.map_err(|_| ApiError::bad_request(MISSING_FIELDS))?;
    let (Some(email), Some(password)) = (present(req.email), present(req.password)) else {
        return Err(ApiError::bad_request(MISSING_FIELDS));
    };

    let mut user = state
        .store
        .find_user(&email)
        .await?
        .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;

    // Google accounts have no password to check against
    let matches = user
        .password_hash
        .as_deref()
        .map(|hash| verify_password(&password, hash))
        .unwrap_or(false);
    if !matches {
        warn!("Failed login for {}", email);
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let token = state.tokens.issue(&user.email)?;
    user.last_login = Some(Utc::now());
    state.store.update_user(user.clone()).await?;

    Ok(Json(LoginResponse {
        token,
        username: user.username,
        email: user.email,
    }))
}

#[tracing::instrument(name = "POST /auth/google", skip_all)]
pub async fn google_sign_in(
    State(state): State<SharedState>,
    body: Result<Json<GoogleSignInRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let verifier = state.google.clone().ok_or_else(|| {
        ApiError::ServiceUnavailable("Google sign-in is not configured".to_string())
    })?;

    let id_token = body
        .ok()
        .and_then(|Json(req)| present(req.id_token))
        .ok_or_else(|| ApiError::bad_request("ID token is required"))?;

    let identity = verifier.verify(&id_token).await.map_err(|e| {
        warn!("Rejected Google token: {}", e);
        ApiError::unauthorized("Invalid Google token")
    })?;

    let now = Utc::now();
    let user = match state.store.find_user(&identity.email).await? {
        Some(mut user) => {
            user.username = identity.name;
            user.profile_picture = Some(identity.picture);
            user.google_id = Some(identity.subject);
            user.last_login = Some(now);
            state.store.update_user(user.clone()).await?;
            user
        }
        None => {
            let user = User {
                id: Uuid::new_v4(),
                username: identity.name,
                email: identity.email,
                password_hash: None,
                google_id: Some(identity.subject),
                profile_picture: Some(identity.picture),
                auth_provider: AuthProvider::Google,
                created_at: now,
                last_login: Some(now),
            };
            state.store.insert_user(user.clone()).await?;
            info!("Created Google account {}", user.email);
            user
        }
    };

    let token = state.tokens.issue(&user.email)?;
    Ok(Json(json!({
        "token": token,
        "user": {
            "username": user.username,
            "email": user.email,
            "profile_picture": user.profile_picture,
        }
    })))
}
