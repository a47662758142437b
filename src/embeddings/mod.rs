// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multimodal embedding models
//!
//! `MultimodalEmbedder` is the single interface the HTTP layer sees. It is
//! implemented by `OnnxMultimodalModel` (one device) and `ReplicatedEmbedder`
//! (one replica per accelerator).

pub mod device;
pub mod loader;
pub mod onnx_model;
pub mod pooling;
pub mod replication;

pub use device::{DeviceError, DeviceSelection, ExecutionDevice};
pub use loader::{load_embedder, LoadOptions};
pub use onnx_model::OnnxMultimodalModel;
pub use replication::ReplicatedEmbedder;

use anyhow::Result;
use image::DynamicImage;
use serde::Serialize;

use crate::models::Precision;

/// Default template for instruction-conditioned text embeddings
pub const DEFAULT_INSTRUCTION_TEMPLATE: &str = "Instruct: {instruction}\nQuery: {text}";

/// Default maximum token length for the text encoder (CLIP context size)
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 77;

/// Text and image embedding over a loaded model.
///
/// Calls are blocking; async callers go through `spawn_blocking`.
/// Implementations return one vector per input, in input order.
pub trait MultimodalEmbedder: Send + Sync {
    fn embed_texts(&self, texts: &[String], instruction: Option<&str>) -> Result<Vec<Vec<f32>>>;

    fn embed_images(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>>;

    fn info(&self) -> ModelInfo;
}

/// Description of a loaded model, reported by `/health`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub dimension: usize,
    pub devices: Vec<String>,
    pub precision: Precision,
}

/// Encoder behaviour shared by every replica
#[derive(Debug, Clone)]
pub struct EncoderOptions {
    /// Must contain `{instruction}` and `{text}`
    pub instruction_template: String,
    pub normalize: bool,
    pub max_text_length: usize,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            instruction_template: DEFAULT_INSTRUCTION_TEMPLATE.to_string(),
            normalize: true,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
        }
    }
}

/// Formats every text with the instruction. An absent or empty instruction
/// leaves the texts unchanged.
pub fn apply_instruction(template: &str, instruction: Option<&str>, texts: &[String]) -> Vec<String> {
    match instruction.filter(|i| !i.is_empty()) {
        Some(instruction) => texts
            .iter()
            .map(|text| fill_template(template, instruction, text))
            .collect(),
        None => texts.to_vec(),
    }
}

/// Single left-to-right pass, so placeholders inside the substituted values
/// are left alone
fn fill_template(template: &str, instruction: &str, text: &str) -> String {
    let mut out = String::with_capacity(template.len() + instruction.len() + text.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{instruction}") {
            out.push_str(instruction);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{text}") {
            out.push_str(text);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}
