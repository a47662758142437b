// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod embeddings;
pub mod models;
pub mod version;
pub mod vision;

pub use api::{create_app, start_server, ApiError, AppState, EmbeddingsResponse, TextEmbedRequest};
pub use config::ServiceConfig;
pub use embeddings::{
    load_embedder, DeviceSelection, EncoderOptions, ExecutionDevice, LoadOptions, ModelInfo,
    MultimodalEmbedder,
    OnnxMultimodalModel, ReplicatedEmbedder,
};
pub use models::{DownloadConfig, ModelDownloader, ModelFiles, ModelLayout, Precision};
