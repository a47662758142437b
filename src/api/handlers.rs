// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::version;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub dimension: usize,
    pub devices: Vec<String>,
    pub precision: String,
    pub version: String,
    pub features: Vec<String>,
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let info = state.embedder.info();
    Json(HealthResponse {
        status: "ok".to_string(),
        model: info.name,
        dimension: info.dimension,
        devices: info.devices,
        precision: info.precision.as_str().to_string(),
        version: version::VERSION_NUMBER.to_string(),
        features: version::FEATURES.iter().map(|f| f.to_string()).collect(),
    })
}
