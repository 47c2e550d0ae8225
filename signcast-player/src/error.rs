use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PlayerError {
    /// Unknown access code. On a previously working code this means the
    /// server rotated it and the player must re-enrol.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Device marked inactive; playback should stop and the setup screen
    /// should show.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Api { status: 403, .. })
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
