// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multi-device replication
//!
//! One full model replica per accelerator. Batches are split into contiguous
//! shards, one per replica, encoded in parallel and stitched back together in
//! input order. Single-item calls rotate across replicas.

use anyhow::{anyhow, Result};
use image::DynamicImage;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::{ModelInfo, MultimodalEmbedder};

pub struct ReplicatedEmbedder {
    replicas: Vec<Arc<dyn MultimodalEmbedder>>,
    next: AtomicUsize,
}

impl std::fmt::Debug for ReplicatedEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedEmbedder")
            .field("replicas", &self.replicas.len())
            .finish_non_exhaustive()
    }
}

impl ReplicatedEmbedder {
    /// Wraps `replicas`; they must all produce the same embedding dimension
    pub fn new(replicas: Vec<Arc<dyn MultimodalEmbedder>>) -> Result<Self> {
        let first = replicas
            .first()
            .ok_or_else(|| anyhow!("Replication needs at least one replica"))?
            .info();

        for replica in &replicas[1..] {
            let info = replica.info();
            if info.dimension != first.dimension {
                anyhow::bail!(
                    "Replica dimension mismatch: {} has {}D, expected {}D",
                    info.devices.join(","),
                    info.dimension,
                    first.dimension
                );
            }
        }

        Ok(Self {
            replicas,
            next: AtomicUsize::new(0),
        })
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// Runs `encode` on contiguous shards of `items` and concatenates the
    /// results in input order
    fn run_sharded<T, F>(&self, items: &[T], encode: F) -> Result<Vec<Vec<f32>>>
    where
        T: Sync,
        F: Fn(&dyn MultimodalEmbedder, &[T]) -> Result<Vec<Vec<f32>>> + Sync,
    {
        if items.is_empty() {
            return Ok(vec![]);
        }

        if items.len() == 1 || self.replicas.len() == 1 {
            let index = self.next.fetch_add(1, Ordering::Relaxed) % self.replicas.len();
            let output = encode(self.replicas[index].as_ref(), items)?;
            return check_count(output, items.len());
        }

        let ranges = shard_ranges(items.len(), self.replicas.len());
        debug!("Sharding {} items across {} replicas", items.len(), ranges.len());

        let encode = &encode;
        let shard_results: Vec<Result<Vec<Vec<f32>>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = ranges
                .iter()
                .zip(&self.replicas)
                .map(|(range, replica)| {
                    let shard = &items[range.clone()];
                    scope.spawn(move || {
                        let output = encode(replica.as_ref(), shard)?;
                        check_count(output, shard.len())
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow!("Replica worker panicked")))
                })
                .collect()
        });

        let mut embeddings = Vec::with_capacity(items.len());
        for result in shard_results {
            embeddings.extend(result?);
        }
        Ok(embeddings)
    }
}

impl MultimodalEmbedder for ReplicatedEmbedder {
    fn embed_texts(&self, texts: &[String], instruction: Option<&str>) -> Result<Vec<Vec<f32>>> {
        self.run_sharded(texts, |replica, shard| replica.embed_texts(shard, instruction))
    }

    fn embed_images(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>> {
        self.run_sharded(images, |replica, shard| replica.embed_images(shard))
    }

    fn info(&self) -> ModelInfo {
        let mut info = self.replicas[0].info();
        info.devices = self
            .replicas
            .iter()
            .flat_map(|replica| replica.info().devices)
            .collect();
        info
    }
}

/// Splits `len` items into at most `parts` contiguous, non-empty ranges whose
/// sizes differ by at most one
pub fn shard_ranges(len: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.min(len).max(1);
    let base = len / parts;
    let extra = len % parts;

    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        if size == 0 {
            break;
        }
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

fn check_count(output: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if output.len() != expected {
        anyhow::bail!(
            "Replica returned {} embeddings for {} inputs",
            output.len(),
            expected
        );
    }
    Ok(output)
}
