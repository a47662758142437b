// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use clap::Parser;
use multimodal_embed_service::{
    load_embedder, start_server, version, AppState, ServiceConfig,
};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Tokenizer thread pools fight with ONNX Runtime's
    if env::var("TOKENIZERS_PARALLELISM").is_err() {
        env::set_var("TOKENIZERS_PARALLELISM", "false");
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::parse();
    info!("🚀 Starting {}", version::get_version_string());

    let addr = config.bind_addr()?;
    let embedder = load_embedder(config.download_config(), config.load_options()).await?;

    let model = embedder.info();
    info!(
        "Model {} loaded: {}D, devices [{}], {}",
        model.name,
        model.dimension,
        model.devices.join(", "),
        model.precision
    );

    let state = AppState::new(embedder.clone()).with_max_image_bytes(config.max_image_bytes);
    start_server(state, addr).await?;

    // The router's clones are gone once the server returns
    info!("Server stopped, releasing model {}", model.name);
    drop(embedder);
    Ok(())
}
