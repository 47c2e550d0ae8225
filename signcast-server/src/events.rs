//! Push channel to currently-connected players.
//!
//! Each WebSocket connection registers a bounded mpsc sender keyed by its
//! access code. Broadcasts enqueue without blocking; a player whose buffer
//! is full simply misses the nudge and converges on its next poll tick.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Server-initiated notifications. All of them mean "refresh sooner than
/// the poll would".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ContentUpdated,
    ScheduleUpdated,
    ConfigUpdated,
    DefaultDisplayUpdated,
}

/// Player-to-server messages over the same stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerMessage {
    Heartbeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screen_width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screen_height: Option<u32>,
    },
}

const CONNECTION_BUFFER: usize = 32;

struct Connection {
    connection_id: String,
    tx: mpsc::Sender<ServerEvent>,
}

/// Registry of live player connections, keyed by access code.
#[derive(Default)]
pub struct EventBus {
    connections: DashMap<String, Vec<Connection>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `access_code`. Returns the connection id
    /// and the receiving half to drain into the socket.
    pub fn register(&self, access_code: &str) -> (String, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        let connection_id = format!("ev_{}", nanoid::nanoid!(8));
        self.connections
            .entry(access_code.to_string())
            .or_default()
            .push(Connection {
                connection_id: connection_id.clone(),
                tx,
            });
        info!(access_code, connection_id, "Player connected to event bus");
        (connection_id, rx)
    }

    pub fn unregister(&self, access_code: &str, connection_id: &str) {
        if let Some(mut entry) = self.connections.get_mut(access_code) {
            entry.retain(|c| c.connection_id != connection_id);
        }
        self.connections
            .remove_if(access_code, |_, conns| conns.is_empty());
        info!(access_code, connection_id, "Player disconnected from event bus");
    }

    /// Push an event to one device's connections. Best-effort.
    pub fn notify(&self, access_code: &str, event: ServerEvent) {
        if let Some(entry) = self.connections.get(access_code) {
            for conn in entry.iter() {
                if conn.tx.try_send(event).is_err() {
                    debug!(
                        access_code,
                        connection_id = conn.connection_id,
                        "Event buffer full, player will catch up on next poll"
                    );
                }
            }
        }
    }

    /// Push an event to every connected player.
    pub fn broadcast(&self, event: ServerEvent) {
        for entry in self.connections.iter() {
            for conn in entry.value().iter() {
                let _ = conn.tx.try_send(event);
            }
        }
    }

    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.connections.iter().map(|e| e.value().len()).sum()
    }
}
