//! WebSocket event stream per connected player.
//!
//! One bidirectional JSON channel keyed on the access code: heartbeats come
//! up, change notifications go down. Losing a message is harmless; the
//! 10-second poll is the backstop.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, State,
    },
    response::{IntoResponse, Response},
};
use futures::{stream::StreamExt, SinkExt};
use tracing::{debug, info, warn};

use signcast_core::models::AccessCode;

use crate::events::PlayerMessage;

use super::{AppError, AppState};

/// `GET /player/{access_code}/events`
pub async fn event_stream(
    Path(access_code): Path<String>,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let code: AccessCode = match access_code.parse() {
        Ok(code) => code,
        Err(_) => return AppError::bad_request("Malformed access code").into_response(),
    };
    if state.registry.device_by_code(&code).is_err() {
        return AppError::not_found("Unknown access code").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, code, addr, state))
}

async fn handle_socket(socket: WebSocket, code: AccessCode, addr: SocketAddr, state: AppState) {
    let (connection_id, mut event_rx) = state.events.register(code.as_str());
    let (mut sender, mut receiver) = socket.split();

    // Forward bus events to the socket.
    let forward = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to encode event: {}", e);
                    continue;
                }
            };
            if sender.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Drain player messages until the socket closes.
    while let Some(result) = receiver.next().await {
        match result {
            Ok(WsMessage::Text(text)) => {
                let msg: PlayerMessage = match serde_json::from_str(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(access_code = code.as_str(), "Ignoring malformed message: {}", e);
                        continue;
                    }
                };
                match msg {
                    PlayerMessage::Heartbeat {
                        screen_width,
                        screen_height,
                    } => {
                        if let Err(e) = state.registry.heartbeat(
                            &code,
                            Some(addr.ip().to_string()),
                            screen_width,
                            screen_height,
                        ) {
                            // Code rotated out from under the connection.
                            warn!(access_code = code.as_str(), "Heartbeat rejected: {}", e);
                            break;
                        }
                    }
                }
            }
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    forward.abort();
    state.events.unregister(code.as_str(), &connection_id);
    state.registry.mark_offline(&code);
    info!(access_code = code.as_str(), "Player stream closed, device offline");
}
