// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Replication over several replicas behaves like a single model

use multimodal_embed_service::{MultimodalEmbedder, ReplicatedEmbedder};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::common::HashingEmbedder;

fn replicated(count: usize) -> (ReplicatedEmbedder, Vec<Arc<HashingEmbedder>>) {
    let replicas: Vec<Arc<HashingEmbedder>> = (0..count).map(|_| HashingEmbedder::new()).collect();
    let handles = replicas
        .iter()
        .map(|r| r.clone() as Arc<dyn MultimodalEmbedder>)
        .collect();
    (ReplicatedEmbedder::new(handles).unwrap(), replicas)
}

#[test]
fn test_matches_single_model_for_any_batch_size() {
    let single = HashingEmbedder::new();
    for replica_count in 1..=4 {
        let (embedder, _) = replicated(replica_count);
        for batch in 0..12 {
            let texts: Vec<String> = (0..batch).map(|i| format!("item-{}", i)).collect();
            let expected = single.embed_texts(&texts, Some("instr")).unwrap();
            let actual = embedder.embed_texts(&texts, Some("instr")).unwrap();
            assert_eq!(actual, expected, "replicas={} batch={}", replica_count, batch);
        }
    }
}

#[test]
fn test_batch_work_is_spread_over_replicas() {
    let (embedder, replicas) = replicated(3);
    let texts: Vec<String> = (0..6).map(|i| i.to_string()).collect();
    embedder.embed_texts(&texts, None).unwrap();

    for replica in &replicas {
        assert_eq!(replica.text_calls.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn test_failure_in_one_replica_fails_the_call() {
    let replicas: Vec<Arc<dyn MultimodalEmbedder>> =
        vec![HashingEmbedder::new(), HashingEmbedder::failing()];
    let embedder = ReplicatedEmbedder::new(replicas).unwrap();

    let texts: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
    let err = embedder.embed_texts(&texts, None).unwrap_err();
    assert!(err.to_string().contains("simulated inference failure"));
}

#[tokio::test]
async fn test_serves_http_requests() {
    use axum::http::StatusCode;
    use multimodal_embed_service::{create_app, AppState};
    use serde_json::json;
    use tower::ServiceExt;

    let (embedder, _) = replicated(2);
    let app = create_app(AppState::new(Arc::new(embedder)));

    let response = app
        .oneshot(crate::common::text_request(json!({"texts": ["x", "y", "z"]})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let embeddings = crate::common::embeddings_of(&crate::common::read_json(response).await);
    assert_eq!(embeddings.len(), 3);
}
