// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image decoding and vision-encoder preprocessing

pub mod image_utils;
pub mod preprocessing;

pub use image_utils::{decode_image_bytes, detect_format, ImageError, ImageInfo, DEFAULT_MAX_IMAGE_BYTES};
pub use preprocessing::{PreprocessorConfig, SizeSpec};
