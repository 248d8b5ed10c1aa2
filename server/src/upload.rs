//! Multipart uploads: reading forms, filename hygiene, saving to disk

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::extract::multipart::{Multipart, MultipartRejection};
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// A file part of a multipart form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn mime(&self) -> String {
        self.content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }
}

/// A fully buffered multipart form
#[derive(Debug, Default)]
pub struct UploadForm {
    files: HashMap<String, UploadedFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Buffer every part; parts carrying a filename are files, the rest text
    pub async fn read(
        multipart: Result<Multipart, MultipartRejection>,
    ) -> Result<Self, ApiError> {
        let mut multipart =
            multipart.map_err(|e| ApiError::bad_request(format!("Invalid form data: {}", e)))?;
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid form data: {}", e)))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid form data: {}", e)))?;
                    debug!("Received file part {} ({} bytes)", name, bytes.len());
                    form.files.insert(
                        name,
                        UploadedFile {
                            file_name,
                            content_type,
                            bytes: bytes.to_vec(),
                        },
                    );
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid form data: {}", e)))?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// True when the name has an image extension the classifier accepts
pub fn allowed_file(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reduce a client-supplied name to a safe single path component
///
/// Keeps ASCII letters, digits, `.`, `-` and `_`; whitespace becomes `_`;
/// leading dots and underscores are stripped so the result can never be
/// `..` or a hidden file.
pub fn secure_filename(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);

    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();

    cleaned.trim_start_matches(['.', '_']).to_string()
}

/// `<prefix><uuid>_<secure name>`, unique per call
pub fn unique_filename(prefix: &str, file_name: &str) -> String {
    let secure = secure_filename(file_name);
    if secure.is_empty() {
        format!("{}{}", prefix, Uuid::new_v4())
    } else {
        format!("{}{}_{}", prefix, Uuid::new_v4(), secure)
    }
}

/// Write an upload into `dir`, returning its path
pub async fn save_upload(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ApiError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, bytes).await?;
    debug!("Saved upload to {:?}", path);
    Ok(path)
}
