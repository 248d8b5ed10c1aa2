use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        State,
    },
    routing::post,
    Json, Router,
};
use tracing::info;

use dermacare::{ImageSource, PredictionResult};

use super::{require_image, ImageRejections};
use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use crate::upload::{save_upload, unique_filename, UploadForm};

const PREDICT_REJECTIONS: ImageRejections = ImageRejections {
    missing: "No image file provided",
    empty_name: "No selected file",
    disallowed: "File type not allowed",
};

pub fn routes() -> Router<SharedState> {
    Router::new().route("/predict", post(predict))
}

/// Classify an uploaded image with the loaded model
#[tracing::instrument(name = "POST /predict", skip_all)]
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<PredictionResult>> {
    let form = UploadForm::read(multipart).await?;
    let file = require_image(&form, &PREDICT_REJECTIONS)?;

    let name = unique_filename("", &file.file_name);
    let path = save_upload(&state.config.upload_dir, &name, &file.bytes).await?;

    // Forward passes are CPU bound; keep them off the async workers
    let predictor = state.predictor();
    let result = tokio::task::spawn_blocking(move || predictor.predict(ImageSource::Path(&path)))
        .await
        .map_err(|e| ApiError::internal(format!("Prediction task failed: {}", e)))??;

    info!(
        "{} -> {} ({:.1}%)",
        file.file_name,
        result.predicted_class,
        result.confidence * 100.0
    );
    Ok(Json(result))
}
