// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /embed/image tests against a deterministic test embedder

use axum::http::StatusCode;
use multimodal_embed_service::{create_app, AppState};
use tower::ServiceExt; // for `oneshot`

use crate::common::{
    embeddings_of, image_request, multipart_body, png_bytes, read_json, test_app, HashingEmbedder,
    TEST_DIMENSION,
};

#[tokio::test]
async fn test_png_returns_single_vector() {
    let embedder = HashingEmbedder::new();
    let app = test_app(embedder.clone());

    let body = multipart_body("file", "red.png", &png_bytes(32, 24, [255, 0, 0]));
    let response = app.oneshot(image_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let embeddings = embeddings_of(&read_json(response).await);
    assert_eq!(embeddings.len(), 1);
    assert_eq!(embeddings[0].len(), TEST_DIMENSION);
    assert_eq!(embedder.image_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_same_image_gives_same_vector() {
    let embedder = HashingEmbedder::new();
    let png = png_bytes(8, 8, [0, 128, 255]);

    let first = embeddings_of(
        &read_json(
            test_app(embedder.clone())
                .oneshot(image_request(multipart_body("file", "a.png", &png)))
                .await
                .unwrap(),
        )
        .await,
    );
    let second = embeddings_of(
        &read_json(
            test_app(embedder.clone())
                .oneshot(image_request(multipart_body("file", "b.png", &png)))
                .await
                .unwrap(),
        )
        .await,
    );
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_not_an_image_rejected_without_inference() {
    let embedder = HashingEmbedder::new();
    let app = test_app(embedder.clone());

    let body = multipart_body("file", "notes.txt", b"not an image");
    let response = app.oneshot(image_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = read_json(response).await;
    assert_eq!(json["detail"], "Unable to decode image");
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_truncated_png_rejected() {
    let embedder = HashingEmbedder::new();
    let app = test_app(embedder.clone());

    let png = png_bytes(16, 16, [1, 2, 3]);
    let body = multipart_body("file", "cut.png", &png[..png.len() / 2]);
    let response = app.oneshot(image_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_missing_file_field_is_unprocessable() {
    let embedder = HashingEmbedder::new();
    let app = test_app(embedder.clone());

    let body = multipart_body("image", "red.png", &png_bytes(4, 4, [255, 0, 0]));
    let response = app.oneshot(image_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let json = read_json(response).await;
    assert!(json["detail"].as_str().unwrap().contains("file"));
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let embedder = HashingEmbedder::new();
    let state = AppState::new(embedder.clone()).with_max_image_bytes(16);
    let app = create_app(state);

    let body = multipart_body("file", "big.png", &png_bytes(64, 64, [9, 9, 9]));
    let response = app.oneshot(image_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_inference_failure_is_internal_error() {
    let app = test_app(HashingEmbedder::failing());

    let body = multipart_body("file", "red.png", &png_bytes(4, 4, [255, 0, 0]));
    let response = app.oneshot(image_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
