use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use qr_art_core::{ArtEngine, WebUiBackend};
use qr_art_server::{app, AppState, ServerConfig};

/// QR Code Monster web front-end
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "QR_ART_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "QR_ART_HOST")]
    host: Option<String>,

    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Base URL of the Stable Diffusion WebUI API
    #[arg(long, env = "QR_ART_WEBUI_URL")]
    webui_url: Option<String>,

    /// ControlNet model name as listed by the WebUI
    #[arg(long, env = "QR_ART_CONTROLNET_MODEL")]
    controlnet_model: Option<String>,

    /// Concurrent AI generations
    #[arg(long, env = "QR_ART_MAX_JOBS")]
    max_jobs: Option<usize>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(url) = self.webui_url {
            config.webui.base_url = url;
        }
        if let Some(model) = self.controlnet_model {
            config.webui.controlnet_model = model;
        }
        if let Some(jobs) = self.max_jobs {
            config.max_concurrent_jobs = jobs;
        }
        Ok(config)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;

    let backend = WebUiBackend::new(config.webui.clone()).context("failed to build WebUI client")?;
    log::info!(
        "Diffusion backend: {} ({})",
        config.webui.base_url,
        config.webui.controlnet_model
    );
    let engine = ArtEngine::new(Arc::new(backend), config.engine.clone());
    log::info!("Engine ready (backend: {})", engine.backend_name());

    let state = AppState::new(engine, &config);
    state.tasks.spawn_eviction(state.task_ttl);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
