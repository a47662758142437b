// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Two-tower ONNX embedding model
//!
//! Wraps a text encoder and a vision encoder exported to ONNX (CLIP-style
//! `text_model.onnx` / `vision_model.onnx`) that project into a shared
//! embedding space.
//!
//! Features:
//! - CUDA execution provider on a chosen device, CPU fallback on failure
//! - Tokenization with truncation and manual batch padding
//! - Pooled (`text_embeds`/`image_embeds`) or token-level outputs
//! - Optional L2 normalization
//! - Embedding dimension discovered by a validation pass at load

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array2;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info, warn};

use super::device::ExecutionDevice;
use super::pooling::{l2_normalize, rows_from_output};
use super::{apply_instruction, EncoderOptions, ModelInfo, MultimodalEmbedder};
use crate::models::{ModelFiles, Precision};
use crate::vision::PreprocessorConfig;

const TEXT_OUTPUT: &str = "text_embeds";
const IMAGE_OUTPUT: &str = "image_embeds";
const DEFAULT_PIXEL_INPUT: &str = "pixel_values";

/// Text encoder inputs this model knows how to feed
const SUPPORTED_TEXT_INPUTS: &[&str] = &["input_ids", "attention_mask", "token_type_ids"];

/// Text and vision encoders bound to one device.
///
/// Each session sits behind its own mutex because `Session::run` needs
/// `&mut`; text and image requests do not block each other.
pub struct OnnxMultimodalModel {
    text_session: Mutex<Session>,
    vision_session: Mutex<Session>,
    tokenizer: Tokenizer,
    preprocessor: PreprocessorConfig,

    /// Declared text inputs, in session order
    text_inputs: Vec<String>,
    text_output: usize,
    vision_input: String,
    vision_output: usize,
    pad_id: i64,

    options: EncoderOptions,
    model_name: String,
    device: ExecutionDevice,
    precision: Precision,
    dimension: usize,
}

impl std::fmt::Debug for OnnxMultimodalModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxMultimodalModel")
            .field("model_name", &self.model_name)
            .field("device", &self.device)
            .field("precision", &self.precision)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl OnnxMultimodalModel {
    /// Loads both encoders onto `device` and validates them.
    ///
    /// # Errors
    /// Returns error if:
    /// - A model, tokenizer or preprocessor file is missing or invalid
    /// - The text encoder declares an input this model cannot feed
    /// - Text and vision embedding dimensions differ
    pub fn load(
        model_name: impl Into<String>,
        files: &ModelFiles,
        device: ExecutionDevice,
        precision: Precision,
        intra_threads: usize,
        options: EncoderOptions,
    ) -> Result<Self> {
        let model_name = model_name.into();

        for path in [&files.text_model, &files.vision_model, &files.tokenizer] {
            if !path.exists() {
                anyhow::bail!("Model file not found: {}", path.display());
            }
        }

        info!(
            "🚀 Loading {} on {} ({})",
            model_name, device, precision
        );

        let (text_session, text_device) = build_session(&files.text_model, device, intra_threads)
            .context("Failed to load text encoder")?;
        let (vision_session, vision_device) =
            build_session(&files.vision_model, device, intra_threads)
                .context("Failed to load vision encoder")?;
        if text_device != vision_device {
            warn!(
                "Encoders placed on different devices: text on {}, vision on {}",
                text_device, vision_device
            );
        }

        let text_inputs: Vec<String> = text_session.inputs.iter().map(|i| i.name.clone()).collect();
        debug!("Text encoder inputs: {:?}", text_inputs);
        if let Some(unknown) = text_inputs
            .iter()
            .find(|name| !SUPPORTED_TEXT_INPUTS.contains(&name.as_str()))
        {
            anyhow::bail!("Text encoder declares unsupported input '{}'", unknown);
        }
        if !text_inputs.iter().any(|name| name == "input_ids") {
            anyhow::bail!("Text encoder has no 'input_ids' input");
        }

        let text_output = output_index(&text_session, TEXT_OUTPUT);
        let vision_output = output_index(&vision_session, IMAGE_OUTPUT);
        let vision_input = vision_session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| DEFAULT_PIXEL_INPUT.to_string());

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        let pad_id = tokenizer.get_padding().map(|p| p.pad_id as i64).unwrap_or(0);
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: options.max_text_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;

        let preprocessor = PreprocessorConfig::from_file(&files.preprocessor_config)?;

        let mut model = Self {
            text_session: Mutex::new(text_session),
            vision_session: Mutex::new(vision_session),
            tokenizer,
            preprocessor,
            text_inputs,
            text_output,
            vision_input,
            vision_output,
            pad_id,
            options,
            model_name,
            device: text_device,
            precision,
            dimension: 0,
        };

        model.dimension = model.validate()?;

        info!(
            "✅ {} ready on {} ({}D embeddings)",
            model.model_name, model.device, model.dimension
        );
        Ok(model)
    }

    /// Runs both encoders once and returns the shared embedding dimension
    fn validate(&self) -> Result<usize> {
        let text = self
            .encode_texts(&["validation test".to_string()])
            .context("Text encoder validation failed")?;
        let (height, width) = self.preprocessor.output_dims();
        let probe = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([128, 128, 128])));
        let image = self
            .encode_images(&[probe])
            .context("Vision encoder validation failed")?;

        let text_dim = text.first().map(Vec::len).unwrap_or(0);
        let image_dim = image.first().map(Vec::len).unwrap_or(0);
        if text_dim == 0 || text_dim != image_dim {
            anyhow::bail!(
                "Encoder dimensions do not match: text {}, vision {}",
                text_dim,
                image_dim
            );
        }
        Ok(text_dim)
    }

    pub fn device(&self) -> ExecutionDevice {
        self.device
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

        // Pad every sequence to the longest in the batch
        let max_len = encodings
            .iter()
            .map(|enc| enc.get_ids().len())
            .max()
            .unwrap_or(0)
            .max(1);
        let batch = encodings.len();

        let mut input_ids = Vec::with_capacity(batch * max_len);
        let mut attention_mask = Vec::with_capacity(batch * max_len);
        for encoding in &encodings {
            let ids = encoding.get_ids();
            let padding = max_len - ids.len();
            input_ids.extend(ids.iter().map(|&id| id as i64));
            input_ids.extend(std::iter::repeat(self.pad_id).take(padding));
            attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
            attention_mask.extend(std::iter::repeat(0i64).take(padding));
        }

        let mut inputs = Vec::with_capacity(self.text_inputs.len());
        for name in &self.text_inputs {
            let data = match name.as_str() {
                "input_ids" => input_ids.clone(),
                "attention_mask" => attention_mask.clone(),
                _ => vec![0i64; batch * max_len],
            };
            let array = Array2::from_shape_vec((batch, max_len), data)
                .with_context(|| format!("Failed to create {} array", name))?;
            inputs.push((name.clone(), Value::from_array(array)?));
        }

        let mut session = self
            .text_session
            .lock()
            .map_err(|_| anyhow!("Text encoder session lock poisoned"))?;
        let outputs = session.run(inputs).context("Text encoder inference failed")?;
        let output = outputs[self.text_output]
            .try_extract_array::<f32>()
            .context("Text encoder output is not a float32 tensor")?;

        let rows = rows_from_output(output, Some(&attention_mask))?;
        Ok(self.finish(rows))
    }

    fn encode_images(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>> {
        if images.is_empty() {
            return Ok(vec![]);
        }

        let pixel_values = self.preprocessor.preprocess_batch(images);
        debug!("Vision input shape: {:?}", pixel_values.shape());
        let input_value =
            Value::from_array(pixel_values).context("Failed to create pixel_values tensor")?;

        let mut session = self
            .vision_session
            .lock()
            .map_err(|_| anyhow!("Vision encoder session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![self.vision_input.as_str() => input_value])
            .context("Vision encoder inference failed")?;
        let output = outputs[self.vision_output]
            .try_extract_array::<f32>()
            .context("Vision encoder output is not a float32 tensor")?;

        let rows = rows_from_output(output, None)?;
        Ok(self.finish(rows))
    }

    fn finish(&self, mut rows: Vec<Vec<f32>>) -> Vec<Vec<f32>> {
        if self.options.normalize {
            rows.iter_mut().for_each(|row| l2_normalize(row));
        }
        rows
    }
}

impl MultimodalEmbedder for OnnxMultimodalModel {
    fn embed_texts(&self, texts: &[String], instruction: Option<&str>) -> Result<Vec<Vec<f32>>> {
        let prepared = apply_instruction(&self.options.instruction_template, instruction, texts);
        self.encode_texts(&prepared)
    }

    fn embed_images(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>> {
        self.encode_images(images)
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model_name.clone(),
            dimension: self.dimension,
            devices: vec![self.device.to_string()],
            precision: self.precision,
        }
    }
}

/// Index of the named output, or the first output when it is absent
fn output_index(session: &Session, preferred: &str) -> usize {
    match session.outputs.iter().position(|o| o.name == preferred) {
        Some(index) => index,
        None => {
            debug!("No '{}' output, using output 0", preferred);
            0
        }
    }
}

/// Builds a session on `device`. A CUDA device that fails to initialize
/// falls back to CPU; the returned device is where the session actually runs.
fn build_session(
    model_path: &Path,
    device: ExecutionDevice,
    intra_threads: usize,
) -> Result<(Session, ExecutionDevice)> {
    if let ExecutionDevice::Cuda(device_id) = device {
        match cuda_session(model_path, device_id, intra_threads) {
            Ok(session) => {
                info!("✅ CUDA execution provider initialized on device {}", device_id);
                return Ok((session, device));
            }
            Err(e) => {
                warn!("⚠️  CUDA execution provider failed on device {}: {}", device_id, e);
                warn!("   Falling back to CPU execution provider");
            }
        }
    }

    let session = Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .context("Failed to set CPU execution provider")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(intra_threads)
        .context("Failed to set intra threads")?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;

    Ok((session, ExecutionDevice::Cpu))
}

fn cuda_session(model_path: &Path, device_id: i32, intra_threads: usize) -> Result<Session> {
    let session = Session::builder()?
        .with_execution_providers([CUDAExecutionProvider::default()
            .with_device_id(device_id)
            .build()
            .error_on_failure()])?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?
        .commit_from_file(model_path)?;
    Ok(session)
}
