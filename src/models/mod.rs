// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Model weight resolution
//!
//! Describes which files make up a two-tower (text + vision) ONNX export,
//! which precision variant to fetch, and downloads them into the local cache.

pub mod downloading;

pub use downloading::{DownloadConfig, ModelDownloader, ModelFiles};

use serde::Serialize;

/// Default repository: CLIP ViT-B/32 exported to ONNX with fp16 variants
pub const DEFAULT_MODEL_ID: &str = "Xenova/clip-vit-base-patch32";

/// Weight precision requested from the model repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Half precision when an accelerator is present, full precision otherwise
    Auto,
    Fp16,
    Fp32,
}

impl Precision {
    /// Resolves `Auto` against the devices that were actually found
    pub fn resolve(self, has_accelerator: bool) -> Precision {
        match self {
            Precision::Auto if has_accelerator => Precision::Fp16,
            Precision::Auto => Precision::Fp32,
            other => other,
        }
    }

    /// File-name suffix of the ONNX variant. Unresolved `Auto` maps to fp32.
    fn file_suffix(self) -> &'static str {
        match self {
            Precision::Fp16 => "_fp16",
            Precision::Fp32 | Precision::Auto => "",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Auto => "auto",
            Precision::Fp16 => "fp16",
            Precision::Fp32 => "fp32",
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository-relative file names of a two-tower ONNX export
#[derive(Debug, Clone, PartialEq)]
pub struct ModelLayout {
    pub tokenizer: String,
    pub preprocessor_config: String,
    /// Fetched when present, never required
    pub model_config: Option<String>,
    pub text_model: String,
    pub vision_model: String,
}

impl ModelLayout {
    /// Layout of transformers.js-style exports (`onnx/text_model_fp16.onnx`, ...)
    pub fn onnx_export(precision: Precision) -> Self {
        let suffix = precision.file_suffix();
        Self {
            tokenizer: "tokenizer.json".to_string(),
            preprocessor_config: "preprocessor_config.json".to_string(),
            model_config: Some("config.json".to_string()),
            text_model: format!("onnx/text_model{}.onnx", suffix),
            vision_model: format!("onnx/vision_model{}.onnx", suffix),
        }
    }

    /// Replaces the encoder file names for repositories with a different layout
    pub fn with_overrides(mut self, text_model: Option<String>, vision_model: Option<String>) -> Self {
        if let Some(text_model) = text_model {
            self.text_model = text_model;
        }
        if let Some(vision_model) = vision_model {
            self.vision_model = vision_model;
        }
        self
    }

    /// Files that must resolve for the model to load
    pub fn required_files(&self) -> Vec<&str> {
        vec![
            self.tokenizer.as_str(),
            self.preprocessor_config.as_str(),
            self.text_model.as_str(),
            self.vision_model.as_str(),
        ]
    }
}
