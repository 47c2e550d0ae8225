// Module: http
// Player-facing HTTP/JSON API. Operator tooling talks to the registry
// through its own layer; everything a kiosk touches lives here.

pub mod error;
pub mod player;
pub mod websocket;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use signcast_core::models::GroupId;
use signcast_core::origin::SyncOriginStore;
use signcast_core::{Config, Registry};

use crate::events::{EventBus, ServerEvent};
use crate::rate_limit::RateLimiter;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub origins: Arc<SyncOriginStore>,
    pub events: Arc<EventBus>,
    pub register_limiter: Arc<RateLimiter>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, registry: Registry, origins: SyncOriginStore) -> Self {
        let register_limiter = Arc::new(RateLimiter::new(
            config.server.register_rate_per_minute,
            60,
        ));
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            origins: Arc::new(origins),
            events: Arc::new(EventBus::new()),
            register_limiter,
        }
    }

    /// Nudge every player bound to `group_id` to refresh ahead of its poll.
    pub fn notify_group(&self, group_id: GroupId, event: ServerEvent) {
        for device in self.registry.devices() {
            if device.group_id == Some(group_id) {
                self.events.notify(device.access_code.as_str(), event);
            }
        }
    }

    /// Nudge every connected player (default-display changes).
    pub fn notify_all(&self, event: ServerEvent) {
        self.events.broadcast(event);
    }
}

/// Create the HTTP router.
pub fn create_router(state: AppState) -> Router {
    let upload_dir = state.config.server.upload_dir.clone();

    Router::new()
        .route("/discover", get(player::discover))
        .route("/time", get(player::server_time))
        .route("/player/register", post(player::register))
        .route("/player/{access_code}/config", get(player::device_config))
        .route("/player/{access_code}/playlist", get(player::playlist))
        .route("/player/{access_code}/events", get(websocket::event_stream))
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
