// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /embed/text HTTP handler

use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::{debug, error};

use crate::api::embed::{EmbeddingsResponse, TextEmbedRequest};
use crate::api::{ApiError, AppState};
use crate::embeddings::MultimodalEmbedder;

/// POST /embed/text handler
///
/// # Request Body
/// ```json
/// { "texts": ["text1", "text2"], "prompt": "optional instruction" }
/// ```
///
/// # Response Body
/// ```json
/// { "embeddings": [[0.1, 0.2, ...], [0.3, 0.4, ...]] }
/// ```
///
/// An empty `texts` list is rejected with 400 before the model is invoked.
pub async fn embed_text_handler(
    State(state): State<AppState>,
    Json(request): Json<TextEmbedRequest>,
) -> Result<Json<EmbeddingsResponse>, ApiError> {
    request.validate()?;

    debug!(
        "Embedding {} text(s), instruction: {}",
        request.texts.len(),
        request.instruction().is_some()
    );

    let expected = request.texts.len();
    let embeddings = run_inference(state.embedder.clone(), move |embedder| {
        embedder.embed_texts(&request.texts, request.instruction())
    })
    .await?;

    if embeddings.len() != expected {
        return Err(ApiError::InternalError(format!(
            "Model returned {} embeddings for {} texts",
            embeddings.len(),
            expected
        )));
    }

    let response = EmbeddingsResponse::new(embeddings);
    debug!(
        "Embedded {} text(s) at {}D",
        expected,
        response.dimension().unwrap_or(0)
    );
    Ok(Json(response))
}

/// Runs a blocking embedding call on the blocking thread pool
pub async fn run_inference<F>(
    embedder: Arc<dyn MultimodalEmbedder>,
    encode: F,
) -> Result<Vec<Vec<f32>>, ApiError>
where
    F: FnOnce(&dyn MultimodalEmbedder) -> anyhow::Result<Vec<Vec<f32>>> + Send + 'static,
{
    tokio::task::spawn_blocking(move || encode(embedder.as_ref()))
        .await
        .map_err(|e| {
            error!("Inference task failed: {}", e);
            ApiError::InternalError("Inference task failed".to_string())
        })?
        .map_err(ApiError::from)
}
