// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the vision encoder
//!
//! Follows the `preprocessor_config.json` shipped with the model: resize the
//! shortest edge, center crop, rescale to [0,1], normalize with the model's
//! mean/std and lay out as NCHW.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array4;
use serde::Deserialize;
use std::path::Path;

/// CLIP normalization mean values
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP normalization std values
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_1];

/// Default encoder input size
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// `size` / `crop_size` entry; the hub uses all three spellings
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    Square(u32),
    ShortestEdge { shortest_edge: u32 },
    Exact { height: u32, width: u32 },
}

impl SizeSpec {
    /// (height, width) for crops; a shortest-edge spec crops to a square
    fn crop_dims(&self) -> (u32, u32) {
        match *self {
            SizeSpec::Square(size) | SizeSpec::ShortestEdge { shortest_edge: size } => (size, size),
            SizeSpec::Exact { height, width } => (height, width),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreprocessorConfig {
    #[serde(default = "default_true")]
    pub do_resize: bool,
    #[serde(default = "default_size")]
    pub size: SizeSpec,
    #[serde(default = "default_true")]
    pub do_center_crop: bool,
    #[serde(default = "default_size")]
    pub crop_size: SizeSpec,
    #[serde(default = "default_true")]
    pub do_rescale: bool,
    #[serde(default = "default_rescale_factor")]
    pub rescale_factor: f32,
    #[serde(default = "default_true")]
    pub do_normalize: bool,
    #[serde(default = "default_mean")]
    pub image_mean: [f32; 3],
    #[serde(default = "default_std")]
    pub image_std: [f32; 3],
}

fn default_true() -> bool {
    true
}

fn default_size() -> SizeSpec {
    SizeSpec::ShortestEdge {
        shortest_edge: DEFAULT_INPUT_SIZE,
    }
}

fn default_rescale_factor() -> f32 {
    1.0 / 255.0
}

fn default_mean() -> [f32; 3] {
    CLIP_MEAN
}

fn default_std() -> [f32; 3] {
    CLIP_STD
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            do_resize: true,
            size: default_size(),
            do_center_crop: true,
            crop_size: default_size(),
            do_rescale: true,
            rescale_factor: default_rescale_factor(),
            do_normalize: true,
            image_mean: CLIP_MEAN,
            image_std: CLIP_STD,
        }
    }
}

impl PreprocessorConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse preprocessor config {}", path.display()))
    }

    /// (height, width) of the tensor handed to the encoder
    pub fn output_dims(&self) -> (u32, u32) {
        if self.do_center_crop {
            return self.crop_size.crop_dims();
        }
        match self.size {
            SizeSpec::Exact { height, width } => (height, width),
            other => other.crop_dims(),
        }
    }

    /// Resize and crop only; the result has exactly `output_dims()` pixels
    pub fn resize_and_crop(&self, image: &DynamicImage) -> RgbImage {
        let (out_h, out_w) = self.output_dims();
        let (orig_w, orig_h) = image.dimensions();

        if orig_w == 0 || orig_h == 0 {
            return RgbImage::from_pixel(out_w, out_h, Rgb([128, 128, 128]));
        }

        let mut working = image.clone();
        if self.do_resize {
            working = match self.size {
                SizeSpec::Exact { height, width } => {
                    working.resize_exact(width, height, FilterType::CatmullRom)
                }
                SizeSpec::Square(edge) | SizeSpec::ShortestEdge { shortest_edge: edge } => {
                    resize_window(&working, edge, out_w, out_h)
                }
            };
        }

        let (cur_w, cur_h) = working.dimensions();
        if (cur_w, cur_h) != (out_w, out_h) {
            // Center crop, then stretch in the rare case the image is smaller
            let crop_x = cur_w.saturating_sub(out_w) / 2;
            let crop_y = cur_h.saturating_sub(out_h) / 2;
            working = working.crop_imm(crop_x, crop_y, out_w.min(cur_w), out_h.min(cur_h));
            if working.dimensions() != (out_w, out_h) {
                working = working.resize_exact(out_w, out_h, FilterType::CatmullRom);
            }
        }

        working.to_rgb8()
    }

    /// Preprocesses a batch into an NCHW tensor `[N, 3, H, W]`
    pub fn preprocess_batch(&self, images: &[DynamicImage]) -> Array4<f32> {
        let (out_h, out_w) = self.output_dims();
        let (height, width) = (out_h as usize, out_w as usize);
        let mut tensor = Array4::zeros((images.len(), 3, height, width));

        for (n, image) in images.iter().enumerate() {
            let rgb = self.resize_and_crop(image);
            for (x, y, pixel) in rgb.enumerate_pixels() {
                for c in 0..3 {
                    tensor[[n, c, y as usize, x as usize]] = self.normalize_channel(pixel[c], c);
                }
            }
        }

        tensor
    }

    fn normalize_channel(&self, value: u8, channel: usize) -> f32 {
        let mut v = value as f32;
        if self.do_rescale {
            v *= self.rescale_factor;
        }
        if self.do_normalize {
            v = (v - self.image_mean[channel]) / self.image_std[channel];
        }
        v
    }
}

/// Scales so the shorter side equals `edge`, keeping aspect ratio
fn shortest_edge_dims(width: u32, height: u32, edge: u32) -> (u64, u64) {
    let (short, long) = if width <= height {
        (width as u64, height as u64)
    } else {
        (height as u64, width as u64)
    };
    let new_long = ((edge as u64 * long) / short.max(1)).max(1);
    if width <= height {
        (edge as u64, new_long)
    } else {
        (new_long, edge as u64)
    }
}

/// Shortest-edge resize that only materializes the centered `out_w x out_h`
/// window of the scaled image. The full scaled size is unbounded for extreme
/// aspect ratios, so the window is cut from the source first.
fn resize_window(image: &DynamicImage, edge: u32, out_w: u32, out_h: u32) -> DynamicImage {
    let (orig_w, orig_h) = image.dimensions();
    let (scaled_w, scaled_h) = shortest_edge_dims(orig_w, orig_h, edge);

    let target_w = scaled_w.min(out_w as u64);
    let target_h = scaled_h.min(out_h as u64);
    let src_w = source_span(target_w, orig_w, scaled_w);
    let src_h = source_span(target_h, orig_h, scaled_h);

    let window = image.crop_imm((orig_w - src_w) / 2, (orig_h - src_h) / 2, src_w, src_h);
    window.resize_exact(
        u32::try_from(target_w).unwrap_or(out_w).max(1),
        u32::try_from(target_h).unwrap_or(out_h).max(1),
        FilterType::CatmullRom,
    )
}

/// Source pixels covering `target` scaled pixels, within `1..=orig`
fn source_span(target: u64, orig: u32, scaled: u64) -> u32 {
    let span = (target * orig as u64).div_ceil(scaled.max(1));
    u32::try_from(span).unwrap_or(orig).clamp(1, orig)
}
