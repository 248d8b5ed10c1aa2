//! HTTP routes, one module per resource

pub mod analysis;
pub mod auth;
pub mod chat;
pub mod health;
pub mod history;
pub mod predict;
pub mod profile;

use crate::error::ApiError;
use crate::upload::{allowed_file, UploadForm, UploadedFile};

/// Name of the multipart part carrying the image on every upload route
pub(crate) const IMAGE_FIELD: &str = "image";

/// Messages returned when the image part of a form is unusable
pub(crate) struct ImageRejections {
    pub missing: &'static str,
    pub empty_name: &'static str,
    pub disallowed: &'static str,
}

pub(crate) const UPLOAD_REJECTIONS: ImageRejections = ImageRejections {
    missing: "No image file provided",
    empty_name: "No file selected",
    disallowed: "Invalid file type. Please upload a PNG, JPG, or JPEG image.",
};

/// The form's image part, checked for a name and an accepted extension
pub(crate) fn require_image<'a>(
    form: &'a UploadForm,
    rejections: &ImageRejections,
) -> Result<&'a UploadedFile, ApiError> {
    let file = form
        .file(IMAGE_FIELD)
        .ok_or_else(|| ApiError::bad_request(rejections.missing))?;
    if file.file_name.is_empty() {
        return Err(ApiError::bad_request(rejections.empty_name));
    }
    if !allowed_file(&file.file_name) {
        return Err(ApiError::bad_request(rejections.disallowed));
    }
    Ok(file)
}
