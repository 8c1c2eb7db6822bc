use anyhow::{Context, Result};
use rollcall_core::RecognitionEngine;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::{BusKind, Config};
use dbus_interface::{RollcallService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env();
    let paths = config.model_paths();
    tracing::info!(model_dir = %config.model_dir.display(), camera = %config.camera_device, "configuration loaded");

    let recognition = RecognitionEngine::load(&paths)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;

    let handle = engine::spawn_engine(
        Arc::new(recognition),
        &config.camera_device,
        config.warmup_frames,
        config.frame_interval_ms,
    )
    .context("failed to start engine")?;

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, RollcallService::new(handle))?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
