// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{body::Body, http::Request, http::StatusCode};
use multimodal_embed_service::api::HealthResponse;
use multimodal_embed_service::{create_app, AppState, MultimodalEmbedder};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

use crate::common::{read_json, test_app, HashingEmbedder, TEST_DIMENSION};

#[tokio::test]
async fn test_health_reports_model() {
    let app = test_app(HashingEmbedder::new());

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = serde_json::from_value(read_json(response).await).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.model, "test/hashing");
    assert_eq!(health.dimension, TEST_DIMENSION);
    assert_eq!(health.devices, vec!["cpu".to_string()]);
    assert_eq!(health.precision, "fp32");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    assert!(health.features.contains(&"image-embeddings".to_string()));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = test_app(HashingEmbedder::new());
    let request = Request::builder()
        .uri("/embed/video")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dropping_router_releases_model_handle() {
    let embedder: Arc<dyn MultimodalEmbedder> = HashingEmbedder::new();
    let app = create_app(AppState::new(embedder.clone()));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(Arc::strong_count(&embedder) > 1);

    drop(app);
    assert_eq!(Arc::strong_count(&embedder), 1);
}
