//! OCR API server binary.
//!
//! ```bash
//! ocr-api --config config.yaml
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ocr_api::cli::Cli;
use ocr_api::engine::OnnxRecognizer;
use ocr_api::server::{init_tracing, start_server};
use ocr_api::ServiceConfig;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ServiceConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    init_tracing(&config.log_level);

    let recognizer = OnnxRecognizer::from_config(&config.engine).with_context(|| {
        format!(
            "failed to load recognition model {}",
            config.engine.model_path.display()
        )
    })?;

    start_server(config, Arc::new(recognizer)).await
}
