// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Shared fixtures for integration tests
#![allow(dead_code)]

use axum::{body::Body, http::Request, response::Response, Router};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use multimodal_embed_service::embeddings::{apply_instruction, DEFAULT_INSTRUCTION_TEMPLATE};
use multimodal_embed_service::{create_app, AppState, ModelInfo, MultimodalEmbedder, Precision};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const TEST_DIMENSION: usize = 16;
pub const BOUNDARY: &str = "----embed-test-boundary";

/// Deterministic stand-in for a real model: each input hashes to a
/// pseudo-random unit vector, so identical inputs give identical output
pub struct HashingEmbedder {
    pub dimension: usize,
    pub text_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
    pub fail: bool,
}

impl HashingEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            dimension: TEST_DIMENSION,
            text_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            dimension: TEST_DIMENSION,
            text_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst) + self.image_calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, seed: u64) -> Vec<f32> {
        let mut current = seed;
        let mut vector: Vec<f32> = (0..self.dimension)
            .map(|i| {
                current = current.wrapping_mul(1664525).wrapping_add(1013904223) ^ (i as u64);
                ((current as f64 / u64::MAX as f64) * 2.0 - 1.0) as f32
            })
            .collect();
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl MultimodalEmbedder for HashingEmbedder {
    fn embed_texts(&self, texts: &[String], instruction: Option<&str>) -> anyhow::Result<Vec<Vec<f32>>> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("simulated inference failure");
        }
        Ok(apply_instruction(DEFAULT_INSTRUCTION_TEMPLATE, instruction, texts)
            .iter()
            .map(|text| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                self.vector_for(hasher.finish())
            })
            .collect())
    }

    fn embed_images(&self, images: &[DynamicImage]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("simulated inference failure");
        }
        Ok(images
            .iter()
            .map(|image| {
                let mut hasher = DefaultHasher::new();
                image.width().hash(&mut hasher);
                image.height().hash(&mut hasher);
                image.as_bytes().hash(&mut hasher);
                self.vector_for(hasher.finish())
            })
            .collect())
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: "test/hashing".to_string(),
            dimension: self.dimension,
            devices: vec!["cpu".to_string()],
            precision: Precision::Fp32,
        }
    }
}

pub fn test_app(embedder: Arc<HashingEmbedder>) -> Router {
    create_app(AppState::new(embedder))
}

pub fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)));
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Single-part multipart/form-data body
pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn image_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/embed/image")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn text_request(json: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/embed/text")
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

pub async fn read_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn embeddings_of(json: &serde_json::Value) -> Vec<Vec<f32>> {
    serde_json::from_value(json["embeddings"].clone()).unwrap()
}
