//! Skin analysis of uploaded images and the caller's analysis history

use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        State,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::{require_image, ImageRejections, UPLOAD_REJECTIONS};
use crate::analysis::SkinAnalysis;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use crate::store::AnalysisRecord;
use crate::upload::{save_upload, unique_filename, UploadForm};

pub const ANALYSIS_HISTORY_LIMIT: usize = 50;

const SAVE_REJECTIONS: ImageRejections = ImageRejections {
    missing: "No image file provided",
    empty_name: "Invalid file type",
    disallowed: "Invalid file type",
};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/analyze-skin", post(analyze_skin))
        .route("/analysis-history", get(analysis_history))
        .route("/save-analysis", post(save_analysis))
}

#[tracing::instrument(name = "POST /analyze-skin", skip_all)]
pub async fn analyze_skin(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<SkinAnalysis>> {
    let form = UploadForm::read(multipart).await?;
    let file = require_image(&form, &UPLOAD_REJECTIONS)?;

    let name = unique_filename("", &file.file_name);
    let path = save_upload(&state.config.upload_dir, &name, &file.bytes).await?;

    let analysis = state.analyzer.analyze(&path);
    info!(
        "Analysis for {}: {:?} ({:.1}%)",
        user.email, analysis.condition, analysis.confidence
    );

    state
        .store
        .insert_analysis(AnalysisRecord {
            id: Uuid::new_v4(),
            user_id: user.id,
            user_email: user.email,
            image_path: path,
            analysis: analysis.clone(),
            saved_manually: false,
            created_at: Utc::now(),
        })
        .await?;

    Ok(Json(analysis))
}

/// The caller's most recent analyses, newest first
#[tracing::instrument(name = "GET /analysis-history", skip_all)]
pub async fn analysis_history(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<SkinAnalysis>>> {
    let records = state
        .store
        .recent_analyses(&user.email, ANALYSIS_HISTORY_LIMIT)
        .await?;
    Ok(Json(records.into_iter().map(|r| r.analysis).collect()))
}

/// Store an analysis the client already holds, together with its image
#[tracing::instrument(name = "POST /save-analysis", skip_all)]
pub async fn save_analysis(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Value>> {
    let form = UploadForm::read(multipart).await?;
    let raw = form
        .field("analysis")
        .ok_or_else(|| ApiError::bad_request("No analysis data provided"))?;
    let file = require_image(&form, &SAVE_REJECTIONS)?;

    let analysis: SkinAnalysis = serde_json::from_str(raw)
        .map_err(|e| ApiError::bad_request(format!("Invalid analysis data: {}", e)))?;

    let name = unique_filename("saved_", &file.file_name);
    let path = save_upload(&state.config.upload_dir, &name, &file.bytes).await?;

    state
        .store
        .insert_analysis(AnalysisRecord {
            id: Uuid::new_v4(),
            user_id: user.id,
            user_email: user.email,
            image_path: path,
            analysis,
            saved_manually: true,
            created_at: Utc::now(),
        })
        .await?;

    Ok(Json(json!({"message": "Analysis saved successfully"})))
}
