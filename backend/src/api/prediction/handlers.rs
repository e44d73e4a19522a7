//! Handler functions for the health and prediction endpoints.
//!
//! Uploads are checked for presence, size and content type before the image
//! is handed to the inference runner.

use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use serde_json::{Value, json};

use crate::app::AppState;
use crate::auth::middleware::MaybeUser;
use crate::errors::{ServiceError, ServiceResult};
use crate::services::inference_service::predict_image;

pub const MAX_UPLOAD_BYTES: usize = 6 * 1024 * 1024;
const FILE_FIELD: &str = "file";
const TOO_LARGE: &str = "Image is too large. Please upload up to 6 MB.";

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// A single uploaded image taken from the `file` form field.
struct Upload {
    bytes: Vec<u8>,
    file_name: Option<String>,
    content_type: Option<String>,
}

/// Handle an image prediction request
pub async fn predict(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServiceResult<Json<Value>> {
    if user.is_none() && !state.predict_allow_anonymous {
        return Err(ServiceError::unauthenticated("Authentication required."));
    }

    let mut multipart = multipart
        .map_err(|_| ServiceError::validation("Expected a multipart/form-data upload."))?;
    let upload = read_upload(&mut multipart).await?;

    if upload.bytes.is_empty() {
        return Err(ServiceError::validation("Empty file uploaded."));
    }
    if upload.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ServiceError::validation(TOO_LARGE));
    }
    let is_image = upload
        .content_type
        .as_deref()
        .is_some_and(|content_type| content_type.starts_with("image/"));
    if !is_image {
        return Err(ServiceError::validation("Please upload an image file."));
    }

    let result = predict_image(
        state.inference.as_ref(),
        upload.bytes,
        upload.file_name.as_deref(),
        state.top_k,
    )
    .await?;

    Ok(Json(result))
}

async fn read_upload(multipart: &mut Multipart) -> ServiceResult<Upload> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(String::from);
        let content_type = field.content_type().map(String::from);
        let bytes = field.bytes().await.map_err(multipart_error)?;

        return Ok(Upload {
            bytes: bytes.to_vec(),
            file_name,
            content_type,
        });
    }

    Err(ServiceError::validation("Missing file field."))
}

fn multipart_error(error: MultipartError) -> ServiceError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::validation(TOO_LARGE)
    } else {
        ServiceError::validation("Invalid multipart payload.")
    }
}
