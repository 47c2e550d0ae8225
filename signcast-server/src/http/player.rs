// Player-facing HTTP handlers

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, State},
    Form, Json,
};
use serde::{Deserialize, Serialize};

use chrono::Datelike;
use signcast_core::models::{
    AccessCode, BackgroundMode, DefaultDisplay, Device, LogoPosition, Orientation, Schedule,
    Transition,
};
use signcast_core::models::display::SlideshowTransition;
use signcast_core::origin::unix_now;
use signcast_core::resolver::{self, ScheduleCheck};

use super::{AppError, AppResult, AppState};

/// `GET /discover`
#[derive(Debug, Serialize)]
pub struct DiscoverResponse {
    pub name: String,
    pub version: String,
    pub ip: String,
    pub port: u16,
}

pub async fn discover(State(state): State<AppState>) -> Json<DiscoverResponse> {
    Json(DiscoverResponse {
        name: state.config.server.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ip: local_ip().unwrap_or_else(|| "127.0.0.1".to_string()),
        port: state.config.server.http_port,
    })
}

/// `GET /time`; players use this for drift diagnostics only.
#[derive(Debug, Serialize)]
pub struct TimeResponse {
    pub time: f64,
}

pub async fn server_time() -> Json<TimeResponse> {
    Json(TimeResponse { time: unix_now() })
}

/// `POST /player/register`
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub access_code: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub device_name: String,
    pub device_id: i64,
}

pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Form(form): Form<RegisterForm>,
) -> AppResult<Json<RegisterResponse>> {
    if let Err(retry_after) = state.register_limiter.check(&addr.ip().to_string()) {
        return Err(AppError::rate_limited(retry_after));
    }

    let code = form.access_code.parse::<AccessCode>()?;
    let device = state.registry.bind_device(&code)?;

    tracing::info!(
        device_id = device.id.as_i64(),
        device_name = %device.name,
        "Player registered"
    );

    Ok(Json(RegisterResponse {
        success: true,
        device_name: device.name,
        device_id: device.id.as_i64(),
    }))
}

/// Device settings as exposed to the player.
#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub id: i64,
    pub name: String,
    pub orientation: Orientation,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_group_id: Option<i64>,
}

impl DeviceResponse {
    fn from_device(device: &Device) -> Self {
        Self {
            id: device.id.as_i64(),
            name: device.name.clone(),
            orientation: device.orientation,
            flip_horizontal: device.flip_horizontal,
            flip_vertical: device.flip_vertical,
            schedule_group_id: device.group_id.map(|g| g.as_i64()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BackgroundResponse {
    pub filename: String,
    pub url: String,
    pub order: i32,
}

#[derive(Debug, Serialize)]
pub struct DefaultDisplayResponse {
    pub logo_filename: Option<String>,
    pub logo_url: Option<String>,
    pub logo_scale: f64,
    pub logo_position: LogoPosition,
    pub background_mode: BackgroundMode,
    pub background_color: String,
    pub background_video: Option<String>,
    pub background_video_url: Option<String>,
    pub slideshow_duration: f64,
    pub slideshow_transition: SlideshowTransition,
    pub backgrounds: Vec<BackgroundResponse>,
}

impl DefaultDisplayResponse {
    fn from_display(display: &DefaultDisplay) -> Self {
        Self {
            logo_url: display
                .logo_filename
                .as_ref()
                .map(|f| format!("/uploads/logos/{f}")),
            logo_filename: display.logo_filename.clone(),
            logo_scale: display.logo_scale,
            logo_position: display.logo_position,
            background_mode: display.background_mode,
            background_color: display.background_color.clone(),
            background_video_url: display
                .background_video
                .as_ref()
                .map(|f| format!("/uploads/backgrounds/{f}")),
            background_video: display.background_video.clone(),
            slideshow_duration: display.slideshow_duration,
            slideshow_transition: display.slideshow_transition,
            backgrounds: display
                .active_backgrounds()
                .into_iter()
                .map(|bg| BackgroundResponse {
                    url: format!("/uploads/backgrounds/{}", bg.filename),
                    filename: bg.filename.clone(),
                    order: bg.order,
                })
                .collect(),
        }
    }
}

/// `GET /player/{access_code}/config`
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub device: DeviceResponse,
    pub default_display: DefaultDisplayResponse,
    pub server_time: f64,
}

pub async fn device_config(
    State(state): State<AppState>,
    Path(access_code): Path<String>,
) -> AppResult<Json<ConfigResponse>> {
    let code = access_code.parse::<AccessCode>()?;
    let device = state.registry.touch_device(&code)?;
    if !device.is_active {
        return Err(AppError::forbidden("Device is inactive"));
    }

    Ok(Json(ConfigResponse {
        device: DeviceResponse::from_device(&device),
        default_display: DefaultDisplayResponse::from_display(&state.registry.default_display()),
        server_time: unix_now(),
    }))
}

/// One playlist entry as the player consumes it.
#[derive(Debug, Serialize)]
pub struct PlaylistEntry {
    pub id: i64,
    pub name: String,
    pub filename: String,
    pub file_type: String,
    pub file_size: u64,
    pub display_duration: f64,
    /// Intrinsic video duration when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub url: String,
    pub order: i32,
}

#[derive(Debug, Serialize)]
pub struct SyncBlock {
    /// Seconds since epoch at which cycle position zero is defined.
    pub start_time: f64,
    /// Sum of effective durations; the cycle repeats at this period.
    pub total_duration: f64,
}

#[derive(Debug, Serialize)]
pub struct DebugBlock {
    pub current_time: String,
    pub current_day: u32,
    pub total_schedules: usize,
    pub total_content: usize,
    pub schedule_check_results: Vec<ScheduleCheck>,
    pub fallback_mode: bool,
}

#[derive(Debug, Serialize)]
pub struct PlaylistResponse {
    pub playlist: Vec<PlaylistEntry>,
    pub active_schedule: Option<Schedule>,
    pub device: OrientationBlock,
    pub transition: Transition,
    pub sync: SyncBlock,
    pub debug: DebugBlock,
}

#[derive(Debug, Serialize)]
pub struct OrientationBlock {
    pub orientation: Orientation,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

/// `GET /player/{access_code}/playlist`
pub async fn playlist(
    State(state): State<AppState>,
    Path(access_code): Path<String>,
) -> AppResult<Json<PlaylistResponse>> {
    let code = access_code.parse::<AccessCode>()?;
    let device = state.registry.touch_device(&code)?;
    if !device.is_active {
        return Err(AppError::forbidden("Device is inactive"));
    }

    let now = chrono::Local::now();
    let (group, schedules, items) = match device.group_id {
        Some(group_id) => (
            state.registry.group(group_id).ok(),
            state.registry.schedules_for_group(group_id),
            state.registry.content_for_group(group_id),
        ),
        None => (None, Vec::new(), Vec::new()),
    };

    let resolution = resolver::resolve(group.as_ref(), &schedules, &items, &now);

    // The origin is minted over the group's active composition, not the
    // schedule-gated playlist: a window opening or closing must not move
    // cycle position zero.
    let sync = match device.group_id {
        Some(group_id) => {
            let active = state.registry.active_playlist(group_id);
            let origin = state.origins.refresh(group_id, &active, unix_now())?;
            SyncBlock {
                start_time: origin.origin,
                total_duration: origin.cycle_duration,
            }
        }
        None => SyncBlock {
            start_time: 0.0,
            total_duration: 0.0,
        },
    };

    let playlist = resolution
        .playlist
        .iter()
        .map(|item| PlaylistEntry {
            id: item.id.as_i64(),
            name: item.name.clone(),
            filename: item.filename.clone(),
            file_type: item.kind.file_type().to_string(),
            file_size: item.file_size,
            display_duration: item.display_duration,
            duration: match item.kind {
                signcast_core::models::ContentKind::Video { intrinsic_duration } => {
                    intrinsic_duration
                }
                signcast_core::models::ContentKind::Image => None,
            },
            url: format!("/uploads/content/{}", item.filename),
            order: item.order,
        })
        .collect();

    let transition = group.as_ref().map_or_else(Transition::cut, |g| g.transition);

    Ok(Json(PlaylistResponse {
        playlist,
        active_schedule: resolution.active_schedule,
        device: OrientationBlock {
            orientation: device.orientation,
            flip_horizontal: device.flip_horizontal,
            flip_vertical: device.flip_vertical,
        },
        transition,
        sync,
        debug: DebugBlock {
            current_time: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            current_day: now.weekday().num_days_from_monday(),
            total_schedules: resolution.total_schedules,
            total_content: resolution.total_content,
            schedule_check_results: resolution.checks,
            fallback_mode: resolution.fallback_mode,
        },
    }))
}

/// Best-effort local IP for `/discover`: route a UDP socket outward and
/// read the chosen source address.
fn local_ip() -> Option<String> {
    use std::net::UdpSocket;
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| s.connect("8.8.8.8:80").map(|()| s))
        .and_then(|s| s.local_addr())
        .map(|addr| addr.ip().to_string())
        .ok()
}
