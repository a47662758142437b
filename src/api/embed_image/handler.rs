// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /embed/image HTTP handler

use axum::{extract::State, Json};
use axum_extra::extract::Multipart;
use tracing::{debug, warn};

use crate::api::embed::{run_inference, EmbeddingsResponse};
use crate::api::{ApiError, AppState};
use crate::vision::decode_image_bytes;

/// Multipart field carrying the image bytes
pub const UPLOAD_FIELD: &str = "file";

/// POST /embed/image handler
///
/// # Request
/// `multipart/form-data` with the image in the `file` part.
///
/// # Response Body
/// ```json
/// { "embeddings": [[0.1, 0.2, ...]] }
/// ```
///
/// # Errors
/// - 422: no `file` part
/// - 400: bytes are not a decodable image, or exceed the upload limit
/// - 500: inference failed
pub async fn embed_image_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<EmbeddingsResponse>, ApiError> {
    let bytes = read_upload(multipart).await?;

    let (image, info) = decode_image_bytes(&bytes, state.max_image_bytes).map_err(|e| {
        warn!("Failed to decode image upload: {}", e);
        ApiError::from(e)
    })?;

    debug!(
        "Decoded image: {}x{} {:?}, {} bytes",
        info.width, info.height, info.format, info.size_bytes
    );

    let embeddings = run_inference(state.embedder.clone(), move |embedder| {
        embedder.embed_images(std::slice::from_ref(&image))
    })
    .await?;

    if embeddings.len() != 1 {
        return Err(ApiError::InternalError(format!(
            "Model returned {} embeddings for 1 image",
            embeddings.len()
        )));
    }

    let response = EmbeddingsResponse::new(embeddings);
    debug!("Embedded image at {}D", response.dimension().unwrap_or(0));
    Ok(Json(response))
}

/// Reads the `file` part fully into memory, skipping any other parts
async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    loop {
        let field = multipart.next_field().await.map_err(|e| {
            warn!("Malformed multipart body: {}", e);
            ApiError::InvalidRequest(format!("Malformed multipart body: {}", e))
        })?;

        let Some(field) = field else {
            return Err(ApiError::MissingField(UPLOAD_FIELD.to_string()));
        };

        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let bytes = field.bytes().await.map_err(|e| {
            warn!("Failed to read upload: {}", e);
            ApiError::InvalidRequest(format!("Failed to read upload: {}", e))
        })?;
        return Ok(bytes.to_vec());
    }
}
