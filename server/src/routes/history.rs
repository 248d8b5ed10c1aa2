//! Saved predictions, stored with their image

use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{require_image, UPLOAD_REJECTIONS};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use crate::store::PredictionRecord;
use crate::upload::UploadForm;

pub const HISTORY_LIMIT: usize = 100;

pub fn routes() -> Router<SharedState> {
    Router::new().route("/history", get(fetch_history).post(save_prediction))
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub prediction: String,
    pub confidence: f64,
    pub image_base64: String,
    pub image_mime: String,
    pub created_at: String,
}

impl From<PredictionRecord> for HistoryEntry {
    fn from(record: PredictionRecord) -> Self {
        Self {
            id: record.id,
            prediction: record.prediction,
            confidence: record.confidence,
            image_base64: record.image_base64,
            image_mime: record.image_mime,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[tracing::instrument(name = "POST /history", skip_all)]
pub async fn save_prediction(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let form = UploadForm::read(multipart).await?;
    let file = require_image(&form, &UPLOAD_REJECTIONS)?;

    let (Some(prediction), Some(confidence)) = (form.field("prediction"), form.field("confidence"))
    else {
        return Err(ApiError::bad_request("Missing prediction or confidence"));
    };
    let confidence: f64 = confidence
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid confidence value"))?;

    let record = PredictionRecord {
        id: Uuid::new_v4(),
        user_id: user.id,
        user_email: user.email,
        prediction: prediction.to_string(),
        confidence,
        image_base64: STANDARD.encode(&file.bytes),
        image_mime: file.mime(),
        created_at: Utc::now(),
    };
    let id = record.id;
    state.store.insert_prediction(record).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "Saved", "id": id})),
    ))
}

/// The caller's most recent predictions, newest first
#[tracing::instrument(name = "GET /history", skip_all)]
pub async fn fetch_history(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    let records = state
        .store
        .recent_predictions(&user.email, HISTORY_LIMIT)
        .await?;
    Ok(Json(records.into_iter().map(HistoryEntry::from).collect()))
}
