// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Conversion of encoder outputs into per-item embedding vectors

use anyhow::{Context, Result};
use ndarray::{ArrayView3, ArrayViewD, Axis, Ix2, Ix3};

/// Turns an encoder output into one vector per batch row.
///
/// - `[batch, hidden]`: already pooled, copied row by row
/// - `[batch, seq_len, hidden]`: mean-pooled over tokens, weighted by
///   `attention_mask` (flattened `[batch, seq_len]`; `None` weights every token)
pub fn rows_from_output(
    output: ArrayViewD<'_, f32>,
    attention_mask: Option<&[i64]>,
) -> Result<Vec<Vec<f32>>> {
    match output.ndim() {
        2 => {
            let pooled = output
                .into_dimensionality::<Ix2>()
                .context("Failed to view pooled output")?;
            Ok(pooled.outer_iter().map(|row| row.to_vec()).collect())
        }
        3 => {
            let tokens = output
                .into_dimensionality::<Ix3>()
                .context("Failed to view token-level output")?;
            let (batch, seq_len, _) = tokens.dim();
            if let Some(mask) = attention_mask {
                if mask.len() != batch * seq_len {
                    anyhow::bail!(
                        "Attention mask has {} entries, expected {} ({} x {})",
                        mask.len(),
                        batch * seq_len,
                        batch,
                        seq_len
                    );
                }
            }
            Ok(mean_pool(tokens, attention_mask))
        }
        _ => anyhow::bail!("Unexpected encoder output shape: {:?}", output.shape()),
    }
}

/// Mean pooling over the sequence axis, ignoring masked-out tokens
pub fn mean_pool(tokens: ArrayView3<'_, f32>, attention_mask: Option<&[i64]>) -> Vec<Vec<f32>> {
    let (batch, seq_len, hidden_dim) = tokens.dim();
    let mut embeddings = Vec::with_capacity(batch);

    for batch_idx in 0..batch {
        let item = tokens.index_axis(Axis(0), batch_idx);
        let mut pooled = vec![0.0f32; hidden_dim];
        let mut sum_mask = 0.0f32;

        for i in 0..seq_len {
            let mask_value = attention_mask
                .map(|mask| mask[batch_idx * seq_len + i] as f32)
                .unwrap_or(1.0);
            if mask_value == 0.0 {
                continue;
            }
            sum_mask += mask_value;
            for (j, value) in pooled.iter_mut().enumerate() {
                *value += item[[i, j]] * mask_value;
            }
        }

        for value in &mut pooled {
            *value /= sum_mask.max(1e-9);
        }
        embeddings.push(pooled);
    }

    embeddings
}

/// Scales `vector` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}
