use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use signcast_core::origin::SyncOriginStore;
use signcast_core::{logging, Config, Registry};
use signcast_server::{create_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "signcast-server", about = "Signcast control server")]
struct Args {
    /// Path to a TOML config file; SIGNCAST_* environment variables
    /// override it.
    #[arg(long, env = "SIGNCAST_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    logging::init_logging(&config.logging)?;
    info!("Signcast server starting...");
    info!("HTTP address: {}", config.http_address());

    // Upload directories must exist before ServeDir mounts them.
    for dir in [
        config.content_dir(),
        config.logos_dir(),
        config.backgrounds_dir(),
    ] {
        std::fs::create_dir_all(&dir)?;
    }
    std::fs::create_dir_all(&config.server.data_dir)?;

    // Origins survive restarts; a reboot must not shift cycle position zero.
    let origins = SyncOriginStore::load(config.server.data_dir.join("sync_origins.json"))?;
    let registry = Registry::new();

    let addr = config.http_address();
    let state = AppState::new(config, registry, origins);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Signcast server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
