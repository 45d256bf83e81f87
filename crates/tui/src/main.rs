mod app;

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};

use gamehub_core::{
    config::{self, AppConfig},
    Catalog, Connectivity, SelectionStore,
};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load()?;
    if config.api_key.is_empty() {
        tracing::warn!(
            path = %config::config_path().display(),
            "no API key configured; the catalog will reject requests"
        );
    }

    let store = SelectionStore::new();
    let catalog = Catalog::new(&config, store, Connectivity::default())
        .context("failed to build catalog client")?;
    let watcher = catalog.watch_selection();

    let mut app = app::GamehubApp::new(catalog);
    let result = app.run().await;
    watcher.abort();
    result
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("gamehub.log");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Stdout belongs to the terminal UI, so everything goes to the log file.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(move || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .expect("failed to open log file")
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}
