// ============================
// crates/backend-bin/src/main.rs
// ============================
//! Server binary: load settings, open the document store, serve `/ws`.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use smartdoor_backend_lib::calendar::NoopFetcher;
use smartdoor_backend_lib::config::Settings;
use smartdoor_backend_lib::store::FlatFileStore;
use smartdoor_backend_lib::{ws_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "smartdoor-server", about = "Smart-door display sync server")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Override the data directory from the config file
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load_from(&args.config)
        .with_context(|| format!("loading settings from {}", args.config.display()))?;
    if let Some(data_dir) = args.data_dir {
        settings.data_dir = data_dir;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    let store = Arc::new(
        FlatFileStore::open(&settings.data_dir)
            .with_context(|| format!("opening store at {}", settings.data_dir.display()))?,
    );

    let bind_addr = settings.bind_addr;
    let state = Arc::new(AppState::new(store, Arc::new(NoopFetcher), settings));
    let app = ws_router::create_router(state);

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(%bind_addr, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
