use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod gemini;
mod kiosk;
mod scanner;
mod state;
mod store;

use config::Config;
use dbus_interface::{KioskService, BUS_NAME, OBJECT_PATH};
use facelog_hw::V4lProvider;
use gemini::GeminiClient;
use kiosk::Kiosk;
use scanner::{ScanSettings, Scanner};
use state::AppState;
use store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facelogd starting");

    let config = Config::from_env();
    if config.api_key.is_empty() {
        tracing::warn!("no API key set (FACELOG_API_KEY); every recognition will be a non-match");
    }

    let store = Store::open(&config.db_path)
        .with_context(|| format!("opening store at {}", config.db_path.display()))?;
    let state = AppState::load(store).context("loading collections")?.into_shared();

    let recognizer = GeminiClient::new(
        &config.api_base,
        &config.model,
        config.api_key.clone(),
        config.request_timeout(),
    )
    .context("building recognition client")?;
    tracing::info!(model = %config.model, base = %config.api_base, "recognition client ready");

    let camera = V4lProvider::new(config.camera_device.clone(), config.warmup_frames);
    tracing::info!(device = %config.camera_device, "camera provider configured");

    let scanner = Scanner::new(
        state.clone(),
        Arc::new(recognizer),
        Arc::new(camera),
        ScanSettings {
            max_references: config.max_references,
            jpeg_quality: config.jpeg_quality,
            recognition_timeout: config.recognition_task_timeout(),
        },
    );
    let kiosk = Arc::new(Kiosk::new(
        state,
        scanner,
        config.jpeg_quality,
        config.utc_offset(),
    ));

    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, KioskService::new(kiosk.clone()))?
        .build()
        .await
        .context("registering on the session bus")?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "facelogd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facelogd shutting down");
    kiosk.shutdown();

    Ok(())
}
