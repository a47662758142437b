// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Startup model loading
//!
//! Resolves devices and precision, fetches the matching files into the
//! cache and builds one replica per device. Any failure here is fatal to
//! startup; there is no retry.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use super::device::{DeviceSelection, ExecutionDevice};
use super::{EncoderOptions, MultimodalEmbedder, OnnxMultimodalModel, ReplicatedEmbedder};
use crate::models::{DownloadConfig, ModelDownloader, ModelFiles, ModelLayout, Precision};

/// How the model is instantiated once its files are local
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub precision: Precision,
    pub devices: DeviceSelection,
    pub encoder: EncoderOptions,
    pub intra_threads: usize,
    /// Overrides for repositories that do not use the `onnx/` layout
    pub text_model_file: Option<String>,
    pub vision_model_file: Option<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            precision: Precision::Auto,
            devices: DeviceSelection::Auto,
            encoder: EncoderOptions::default(),
            intra_threads: 4,
            text_model_file: None,
            vision_model_file: None,
        }
    }
}

/// Downloads (or locates) the model and returns the process-wide handle
pub async fn load_embedder(
    download: DownloadConfig,
    options: LoadOptions,
) -> Result<Arc<dyn MultimodalEmbedder>> {
    tokio::task::spawn_blocking(move || load_embedder_blocking(download, options))
        .await
        .context("Model loading task panicked")?
}

fn load_embedder_blocking(
    download: DownloadConfig,
    options: LoadOptions,
) -> Result<Arc<dyn MultimodalEmbedder>> {
    let devices = options.devices.resolve();
    let has_accelerator = devices.iter().any(ExecutionDevice::is_accelerator);
    let precision = options.precision.resolve(has_accelerator);

    info!(
        "📦 Model {} ({}) on [{}]",
        download.repo_id,
        precision,
        devices
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let layout = ModelLayout::onnx_export(precision)
        .with_overrides(options.text_model_file.clone(), options.vision_model_file.clone());
    let downloader = ModelDownloader::new(download)?;
    let model_name = downloader.config().repo_id.clone();
    let files = downloader.fetch(&layout)?;

    build_replicas(&model_name, &files, &devices, precision, &options)
}

fn build_replicas(
    model_name: &str,
    files: &ModelFiles,
    devices: &[ExecutionDevice],
    precision: Precision,
    options: &LoadOptions,
) -> Result<Arc<dyn MultimodalEmbedder>> {
    let mut replicas: Vec<Arc<dyn MultimodalEmbedder>> = Vec::with_capacity(devices.len());
    for &device in devices {
        let model = OnnxMultimodalModel::load(
            model_name,
            files,
            device,
            precision,
            options.intra_threads,
            options.encoder.clone(),
        )
        .with_context(|| format!("Failed to load {} on {}", model_name, device))?;
        if model.device() != device {
            warn!("Replica for {} requested on {} runs on {}", model_name, device, model.device());
        }
        replicas.push(Arc::new(model));
    }

    if replicas.len() == 1 {
        if let Some(model) = replicas.pop() {
            return Ok(model);
        }
    }

    info!("🔁 Replicating {} across {} devices", model_name, replicas.len());
    Ok(Arc::new(ReplicatedEmbedder::new(replicas)?))
}
