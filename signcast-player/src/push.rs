//! WebSocket push channel to the server.
//!
//! Best-effort by design: every inbound event collapses to "refresh now",
//! heartbeats carry presence and screen dimensions upstream, and any
//! failure just waits out a reconnect delay; the poll tick is the
//! correctness backstop.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::engine::EngineEvent;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Server-initiated notifications; all of them mean "poll early".
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PushEvent {
    ContentUpdated,
    ScheduleUpdated,
    ConfigUpdated,
    DefaultDisplayUpdated,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum UpMessage {
    Heartbeat {
        #[serde(skip_serializing_if = "Option::is_none")]
        screen_width: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        screen_height: Option<u32>,
    },
}

/// Screen dimensions as reported by the renderer, if it has reported any.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScreenInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[must_use]
fn stream_url(server_url: &str, access_code: &str) -> String {
    let ws_base = server_url
        .trim_end_matches('/')
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    format!("{ws_base}/player/{access_code}/events")
}

/// Maintain the push connection until `events` has no receiver left.
/// Spawned alongside the engine; never blocks playback.
pub async fn run_push_channel(
    server_url: String,
    access_code: String,
    screen: ScreenInfo,
    events: mpsc::Sender<EngineEvent>,
) {
    let url = stream_url(&server_url, &access_code);

    loop {
        if events.is_closed() {
            return;
        }

        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!("Push channel connected");
                let (mut sink, mut source) = stream.split();
                let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

                loop {
                    tokio::select! {
                        _ = heartbeat.tick() => {
                            let beat = UpMessage::Heartbeat {
                                screen_width: screen.width,
                                screen_height: screen.height,
                            };
                            let json = match serde_json::to_string(&beat) {
                                Ok(json) => json,
                                Err(_) => continue,
                            };
                            if sink.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        message = source.next() => match message {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<PushEvent>(&text) {
                                    Ok(event) => {
                                        debug!(?event, "Server push");
                                        if events.send(EngineEvent::ServerPush).await.is_err() {
                                            return;
                                        }
                                    }
                                    Err(e) => debug!("Ignoring unknown push payload: {}", e),
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("Push channel error: {}", e);
                                break;
                            }
                        },
                    }
                }
                info!("Push channel closed, reconnecting");
            }
            Err(e) => {
                debug!("Push channel connect failed: {}", e);
            }
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url() {
        assert_eq!(
            stream_url("http://10.0.0.5:8000/", "004211"),
            "ws://10.0.0.5:8000/player/004211/events"
        );
        assert_eq!(
            stream_url("https://signs.example.com", "123456"),
            "wss://signs.example.com/player/123456/events"
        );
    }

    #[test]
    fn test_heartbeat_wire_format() {
        let json = serde_json::to_string(&UpMessage::Heartbeat {
            screen_width: Some(1920),
            screen_height: Some(1080),
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"heartbeat","screen_width":1920,"screen_height":1080}"#
        );

        // Unknown dimensions stay unreported, not defaulted.
        let json = serde_json::to_string(&UpMessage::Heartbeat {
            screen_width: None,
            screen_height: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"heartbeat"}"#);
    }

    #[test]
    fn test_push_event_parse() {
        let event: PushEvent = serde_json::from_str(r#"{"type":"content_updated"}"#).unwrap();
        assert!(matches!(event, PushEvent::ContentUpdated));
        assert!(serde_json::from_str::<PushEvent>(r#"{"type":"mystery"}"#).is_err());
    }
}
