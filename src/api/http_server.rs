// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::embed::embed_text_handler;
use super::embed_image::embed_image_handler;
use super::handlers::health_handler;
use crate::embeddings::MultimodalEmbedder;
use crate::vision::DEFAULT_MAX_IMAGE_BYTES;

/// Room for multipart boundaries and part headers on top of the image itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared, read-only state injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub embedder: Arc<dyn MultimodalEmbedder>,
    pub max_image_bytes: usize,
}

impl AppState {
    pub fn new(embedder: Arc<dyn MultimodalEmbedder>) -> Self {
        Self {
            embedder,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.max_image_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health_handler))
        .route("/embed/text", post(embed_text_handler))
        .route("/embed/image", post(embed_image_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serves until Ctrl+C
pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
