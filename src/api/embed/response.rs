// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Response body shared by the text and image embedding endpoints

use serde::{Deserialize, Serialize};

/// One vector per input item, in input order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingsResponse {
    pub embeddings: Vec<Vec<f32>>,
}

impl EmbeddingsResponse {
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        Self { embeddings }
    }

    pub fn dimension(&self) -> Option<usize> {
        self.embeddings.first().map(Vec::len)
    }
}
