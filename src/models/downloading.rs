// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::ModelLayout;

/// Settings for resolving a model snapshot from the Hugging Face hub
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub repo_id: String,
    pub revision: String,
    /// Root of the local hub cache; created if absent
    pub cache_dir: PathBuf,
    pub token: Option<String>,
    pub progress: bool,
}

impl DownloadConfig {
    pub fn new(repo_id: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_id: repo_id.into(),
            revision: "main".to_string(),
            cache_dir: cache_dir.into(),
            token: None,
            progress: true,
        }
    }
}

/// Local paths of a resolved model snapshot
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub tokenizer: PathBuf,
    pub preprocessor_config: PathBuf,
    pub model_config: Option<PathBuf>,
    pub text_model: PathBuf,
    pub vision_model: PathBuf,
}

/// Fetches model files into the local cache.
///
/// Files already in the cache for the configured revision are served
/// from disk without touching the network.
pub struct ModelDownloader {
    config: DownloadConfig,
    api: Api,
}

impl ModelDownloader {
    pub fn new(config: DownloadConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.cache_dir).with_context(|| {
            format!(
                "Failed to create model cache directory {}",
                config.cache_dir.display()
            )
        })?;

        let api = ApiBuilder::new()
            .with_cache_dir(config.cache_dir.clone())
            .with_token(config.token.clone())
            .with_progress(config.progress)
            .build()
            .context("Failed to initialize Hugging Face hub client")?;

        Ok(Self { config, api })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Resolves every file of `layout`, downloading what is missing
    pub fn fetch(&self, layout: &ModelLayout) -> Result<ModelFiles> {
        let repo = self.api.repo(Repo::with_revision(
            self.config.repo_id.clone(),
            RepoType::Model,
            self.config.revision.clone(),
        ));

        info!(
            "Resolving {}@{} into {}",
            self.config.repo_id,
            self.config.revision,
            self.config.cache_dir.display()
        );
        debug!("Required files: {:?}", layout.required_files());

        let model_config = match &layout.model_config {
            Some(name) => match repo.get(name) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Optional file {} unavailable: {}", name, e);
                    None
                }
            },
            None => None,
        };

        let files = ModelFiles {
            tokenizer: self.get_required(&repo, &layout.tokenizer)?,
            preprocessor_config: self.get_required(&repo, &layout.preprocessor_config)?,
            model_config,
            text_model: self.get_required(&repo, &layout.text_model)?,
            vision_model: self.get_required(&repo, &layout.vision_model)?,
        };

        info!("✅ Model files ready for {}", self.config.repo_id);
        Ok(files)
    }

    fn get_required(&self, repo: &ApiRepo, name: &str) -> Result<PathBuf> {
        let path = repo
            .get(name)
            .with_context(|| format!("Failed to fetch {} from {}", name, self.config.repo_id))?;
        debug!("{} -> {}", name, path.display());
        Ok(path)
    }
}
