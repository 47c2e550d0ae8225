//! Loopback HTTP server over the cache directory.
//!
//! The embedded renderer cannot autoplay `file://` media and trips on
//! cross-origin checks, so every asset, cached or remote, is addressed as
//! `http://127.0.0.1:PORT/...`. Read-only, CORS-open, never cached.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{http::header, Router};
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
};
use tracing::info;

use crate::Result;

pub struct MediaServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MediaServer {
    /// Bind `127.0.0.1:port` and serve `/content` and `/splash` from the
    /// cache. Port 0 picks an ephemeral port (tests).
    pub async fn start(content_dir: PathBuf, splash_dir: PathBuf, port: u16) -> Result<Self> {
        let app = Router::new()
            .nest_service("/content", ServeDir::new(content_dir))
            .nest_service("/splash", ServeDir::new(splash_dir))
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                header::HeaderValue::from_static("no-cache"),
            ))
            .layer(CorsLayer::new().allow_origin(Any));

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;
        info!("Local media server on http://{}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                tracing::error!("Media server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
            handle,
        })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn content_url(&self, filename: &str) -> String {
        format!("http://{}/content/{filename}", self.addr)
    }

    #[must_use]
    pub fn splash_url(&self, filename: &str) -> String {
        format!("http://{}/splash/{filename}", self.addr)
    }

    /// Graceful stop; part of the player's single stop-all path.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}
