use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use signcast_core::config::LoggingConfig;
use signcast_core::logging;
use signcast_player::api::ApiClient;
use signcast_player::cache::CacheManager;
use signcast_player::config::{PlayerPaths, MEDIA_SERVER_PORT};
use signcast_player::engine::{EngineEvent, EngineExit, SyncEngine};
use signcast_player::enrolment;
use signcast_player::media_server::MediaServer;
use signcast_player::push::{self, ScreenInfo};
use signcast_player::renderer::{RendererController, TracingSurface};
use signcast_player::PlayerConfig;

#[derive(Parser, Debug)]
#[command(name = "signcast-player", about = "Signcast display player")]
struct Args {
    /// App data directory (config.json, cache/).
    #[arg(long, env = "SIGNCAST_PLAYER_DATA", default_value = "./data")]
    data_dir: String,

    /// Enrol against this server URL (with --access-code) before starting.
    #[arg(long)]
    server_url: Option<String>,

    /// Six-digit access code for enrolment.
    #[arg(long)]
    access_code: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let paths = PlayerPaths::new(&args.data_dir);
    let mut config = PlayerConfig::load(&paths.config_file());

    logging::init_logging(&LoggingConfig {
        level: if config.debug { "debug" } else { "info" }.to_string(),
        format: "pretty".to_string(),
        file_path: None,
    })?;
    info!("Signcast player starting...");

    // One-shot enrolment when both flags are given.
    if let (Some(server_url), Some(code)) = (&args.server_url, &args.access_code) {
        enrolment::enrol(&paths, &mut config, server_url, code).await?;
    }

    let access_code = match config.access_code.clone() {
        Some(code) if config.is_enrolled() => code,
        _ => {
            let found = enrolment::discover_servers().await;
            if found.is_empty() {
                error!("Not enrolled and no server found on this machine.");
            } else {
                for server in &found {
                    info!(
                        "Found server \"{}\" ({}) at {}",
                        server.name, server.version, server.url
                    );
                }
            }
            error!("Run again with --server-url <URL> --access-code <CODE> to enrol.");
            std::process::exit(1);
        }
    };
    let api = ApiClient::new(&config.server_url)?;
    let cache = Arc::new(CacheManager::open(paths.cache_dir())?);

    // The media server is best-effort: with the port taken, the renderer
    // plays straight from origin URLs and the splash still shows.
    let media = match MediaServer::start(
        cache.content_dir().to_path_buf(),
        cache.splash_dir().to_path_buf(),
        MEDIA_SERVER_PORT,
    )
    .await
    {
        Ok(server) => Some(server),
        Err(e) => {
            error!("Local media server failed to start: {}", e);
            None
        }
    };
    let media_base = media.as_ref().map(|m| format!("http://{}", m.addr()));

    let renderer = RendererController::new(Arc::new(TracingSurface));
    let mut engine = SyncEngine::new(api, cache, renderer, access_code.clone(), media_base);

    let (events_tx, events_rx) = mpsc::channel(16);

    // Push channel: early refresh nudges plus heartbeats.
    let push_task = tokio::spawn(push::run_push_channel(
        config.server_url.clone(),
        access_code,
        ScreenInfo::default(),
        events_tx.clone(),
    ));

    // Key bindings: r = resync, q = quit.
    let key_task = tokio::spawn(read_keys(events_tx.clone()));

    // Ctrl-C funnels into the same quit path as the q key.
    let ctrlc_tx = events_tx.clone();
    let ctrlc_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrlc_tx.send(EngineEvent::Quit).await;
        }
    });
    drop(events_tx);

    let exit = engine.run(events_rx).await;
    match exit {
        EngineExit::Quit => info!("Player stopped"),
        EngineExit::ReEnrolRequired => {
            warn!("Access code was rotated on the server; re-enrol with the new code.");
        }
        EngineExit::DeviceInactive => {
            warn!("Device was deactivated on the server; playback stopped.");
        }
    }

    // Stop-all: the single teardown path.
    push_task.abort();
    key_task.abort();
    ctrlc_task.abort();
    if let Some(media) = media {
        media.stop().await;
    }

    Ok(())
}

async fn read_keys(events: mpsc::Sender<EngineEvent>) {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let event = match line.trim() {
            "r" => EngineEvent::ManualResync,
            "q" => EngineEvent::Quit,
            _ => continue,
        };
        if events.send(event).await.is_err() {
            return;
        }
    }
}
