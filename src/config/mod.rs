// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration
//!
//! Every option is a CLI flag with an environment-variable fallback, so the
//! service can be configured from a `.env` file, the shell or the command line.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::embeddings::{
    DeviceSelection, EncoderOptions, LoadOptions, DEFAULT_INSTRUCTION_TEMPLATE,
    DEFAULT_MAX_TEXT_LENGTH,
};
use crate::models::{DownloadConfig, Precision, DEFAULT_MODEL_ID};
use crate::vision::DEFAULT_MAX_IMAGE_BYTES;

/// Cache directory name under the home directory
pub const DEFAULT_MODEL_DIR_NAME: &str = "gme_models";

/// Multimodal embedding service
#[derive(Parser, Debug, Clone)]
#[command(name = "multimodal-embed-service")]
#[command(version)]
#[command(about = "HTTP service for text and image embeddings", long_about = None)]
pub struct ServiceConfig {
    /// Model cache directory (default: ~/gme_models)
    #[arg(long, env = "GME_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Hugging Face repository of the ONNX export
    #[arg(long, env = "GME_MODEL_ID", default_value = DEFAULT_MODEL_ID)]
    pub model_id: String,

    /// Repository revision (branch, tag or commit)
    #[arg(long, env = "GME_MODEL_REVISION", default_value = "main")]
    pub revision: String,

    #[arg(long, env = "GME_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "GME_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Weight precision; auto picks fp16 with a GPU and fp32 otherwise
    #[arg(long, env = "GME_PRECISION", value_enum, default_value_t = Precision::Auto)]
    pub precision: Precision,

    /// "auto", "cpu" or comma-separated CUDA ordinals such as "0,1"
    #[arg(long, env = "GME_DEVICES", default_value = "auto")]
    pub devices: DeviceSelection,

    /// Token limit for the text encoder; longer inputs are truncated
    #[arg(long, env = "GME_MAX_TEXT_LENGTH", default_value_t = DEFAULT_MAX_TEXT_LENGTH)]
    pub max_text_length: usize,

    /// Template for instruction-conditioned texts ({instruction}, {text})
    #[arg(long, env = "GME_INSTRUCTION_TEMPLATE", default_value = DEFAULT_INSTRUCTION_TEMPLATE)]
    pub instruction_template: String,

    /// L2-normalize embeddings
    #[arg(long, env = "GME_NORMALIZE", default_value_t = true, action = clap::ArgAction::Set)]
    pub normalize: bool,

    /// Largest accepted image upload in bytes
    #[arg(long, env = "GME_MAX_IMAGE_BYTES", default_value_t = DEFAULT_MAX_IMAGE_BYTES)]
    pub max_image_bytes: usize,

    /// Access token for gated or private repositories
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    /// ONNX Runtime intra-op threads per session
    #[arg(long, env = "GME_INTRA_THREADS", default_value_t = 4)]
    pub intra_threads: usize,

    /// Text encoder path inside the repository (overrides onnx/text_model*.onnx)
    #[arg(long, env = "GME_TEXT_MODEL_FILE")]
    pub text_model_file: Option<String>,

    /// Vision encoder path inside the repository (overrides onnx/vision_model*.onnx)
    #[arg(long, env = "GME_VISION_MODEL_FILE")]
    pub vision_model_file: Option<String>,
}

impl ServiceConfig {
    /// Cache root: `--model-dir`, else `~/gme_models`, else `./gme_models`
    pub fn model_root(&self) -> PathBuf {
        match &self.model_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_MODEL_DIR_NAME),
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("Invalid host address '{}'", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn download_config(&self) -> DownloadConfig {
        let mut config = DownloadConfig::new(self.model_id.clone(), self.model_root());
        config.revision = self.revision.clone();
        config.token = self.hf_token.clone();
        config
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            precision: self.precision,
            devices: self.devices.clone(),
            encoder: EncoderOptions {
                instruction_template: self.instruction_template.clone(),
                normalize: self.normalize,
                max_text_length: self.max_text_length,
            },
            intra_threads: self.intra_threads,
            text_model_file: self.text_model_file.clone(),
            vision_model_file: self.vision_model_file.clone(),
        }
    }
}
