// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the multimodal embedding service

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Service name used in logs and the health endpoint
pub const SERVICE_NAME: &str = "multimodal-embed-service";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "text-embeddings",
    "image-embeddings",
    "instruction-conditioning",
    "hf-hub-cache",
    "cuda-execution-provider",
    "multi-device-replication",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("{} {}", SERVICE_NAME, VERSION_NUMBER)
}
