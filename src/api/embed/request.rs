// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Request body for POST /embed/text

use crate::api::ApiError;
use serde::{Deserialize, Serialize};

/// # Example
/// ```json
/// {
///   "texts": ["a photo of a cat", "a photo of a dog"],
///   "prompt": "Find images that match the caption"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextEmbedRequest {
    /// Texts to embed, in order. Must not be empty.
    pub texts: Vec<String>,

    /// Optional instruction applied to every text
    #[serde(default)]
    pub prompt: Option<String>,
}

impl TextEmbedRequest {
    /// Rejects an empty `texts` list. Individual strings are not checked;
    /// empty strings are valid input to the tokenizer.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.texts.is_empty() {
            return Err(ApiError::ValidationError {
                field: "texts".to_string(),
                message: "texts must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// The instruction to apply, treating an empty prompt as none
    pub fn instruction(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.is_empty())
    }
}
