// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Image embedding API
//!
//! POST /embed/image accepts one multipart upload in the field `file` and
//! returns a single embedding vector.

pub mod handler;

pub use handler::{embed_image_handler, UPLOAD_FIELD};
