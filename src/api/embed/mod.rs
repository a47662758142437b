// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Text embedding API
//!
//! POST /embed/text turns a list of strings, optionally conditioned on an
//! instruction, into one embedding vector per string.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::{embed_text_handler, run_inference};
pub use request::TextEmbedRequest;
pub use response::EmbeddingsResponse;
