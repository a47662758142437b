// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /embed/text tests against a deterministic test embedder

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt; // for `oneshot`

use crate::common::{embeddings_of, read_json, test_app, text_request, HashingEmbedder, TEST_DIMENSION};

#[tokio::test]
async fn test_two_texts_return_two_vectors() {
    let app = test_app(HashingEmbedder::new());

    let response = app
        .oneshot(text_request(json!({"texts": ["hello", "world"]})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let embeddings = embeddings_of(&read_json(response).await);
    assert_eq!(embeddings.len(), 2);
    assert!(embeddings.iter().all(|e| e.len() == TEST_DIMENSION));
    assert_ne!(embeddings[0], embeddings[1]);
}

#[tokio::test]
async fn test_output_follows_input_order() {
    let embedder = HashingEmbedder::new();
    let texts: Vec<String> = (0..9).map(|i| format!("text number {}", i)).collect();

    let batch = embeddings_of(
        &read_json(
            test_app(embedder.clone())
                .oneshot(text_request(json!({ "texts": texts })))
                .await
                .unwrap(),
        )
        .await,
    );
    assert_eq!(batch.len(), texts.len());

    for (i, text) in texts.iter().enumerate() {
        let single = embeddings_of(
            &read_json(
                test_app(embedder.clone())
                    .oneshot(text_request(json!({ "texts": [text] })))
                    .await
                    .unwrap(),
            )
            .await,
        );
        assert_eq!(single[0], batch[i], "item {} out of order", i);
    }
}

#[tokio::test]
async fn test_empty_texts_rejected_without_inference() {
    let embedder = HashingEmbedder::new();
    let app = test_app(embedder.clone());

    let response = app.oneshot(text_request(json!({"texts": []}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = read_json(response).await;
    assert_eq!(body["detail"], "texts must not be empty");
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_prompt_and_no_prompt_both_succeed() {
    let embedder = HashingEmbedder::new();

    let plain = test_app(embedder.clone())
        .oneshot(text_request(json!({"texts": ["query"]})))
        .await
        .unwrap();
    assert_eq!(plain.status(), StatusCode::OK);
    let plain = embeddings_of(&read_json(plain).await);

    let instructed = test_app(embedder.clone())
        .oneshot(text_request(
            json!({"texts": ["query"], "prompt": "Find a matching image"}),
        ))
        .await
        .unwrap();
    assert_eq!(instructed.status(), StatusCode::OK);
    let instructed = embeddings_of(&read_json(instructed).await);

    assert_eq!(plain.len(), 1);
    assert_eq!(instructed.len(), 1);
    assert_eq!(plain[0].len(), instructed[0].len());
}

#[tokio::test]
async fn test_empty_prompt_matches_no_prompt() {
    let embedder = HashingEmbedder::new();

    let plain = embeddings_of(
        &read_json(
            test_app(embedder.clone())
                .oneshot(text_request(json!({"texts": ["query"], "prompt": null})))
                .await
                .unwrap(),
        )
        .await,
    );
    let empty = embeddings_of(
        &read_json(
            test_app(embedder.clone())
                .oneshot(text_request(json!({"texts": ["query"], "prompt": ""})))
                .await
                .unwrap(),
        )
        .await,
    );
    assert_eq!(plain, empty);
}

#[tokio::test]
async fn test_repeated_requests_are_identical() {
    let embedder = HashingEmbedder::new();
    let request = || text_request(json!({"texts": ["same input"], "prompt": "p"}));

    let first = embeddings_of(&read_json(test_app(embedder.clone()).oneshot(request()).await.unwrap()).await);
    let second = embeddings_of(&read_json(test_app(embedder.clone()).oneshot(request()).await.unwrap()).await);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_missing_texts_field_is_unprocessable() {
    let app = test_app(HashingEmbedder::new());
    let response = app
        .oneshot(text_request(json!({"prompt": "only a prompt"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_inference_failure_is_internal_error() {
    let embedder = HashingEmbedder::failing();
    let app = test_app(embedder.clone());

    let response = app.oneshot(text_request(json!({"texts": ["x"]}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = read_json(response).await;
    assert!(body["detail"].as_str().unwrap().contains("simulated inference failure"));
    assert_eq!(embedder.calls(), 1);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let app = test_app(HashingEmbedder::new());
    let mut request = text_request(json!({"texts": ["cors"]}));
    request
        .headers_mut()
        .insert("origin", "http://example.com".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}
