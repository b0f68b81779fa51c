//! Relay endpoint configuration.
//!
//! The relay address is required. Hosts are expected to treat a
//! [`ConfigError`] as fatal and refuse to start.

use thiserror::Error;
use url::Url;

/// Environment variable holding the relay WebSocket URL.
pub const RELAY_URL_VAR: &str = "SKETCHCAST_RELAY_URL";
/// Environment variable holding the room to join.
pub const ROOM_VAR: &str = "SKETCHCAST_ROOM";
/// Room joined when none is configured.
pub const DEFAULT_ROOM: &str = "lobby";

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid WebSocket URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Validated relay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    relay_url: String,
    room: String,
}

impl RelayConfig {
    /// Validate a relay URL and room name.
    pub fn new(relay_url: &str, room: Option<&str>) -> Result<Self, ConfigError> {
        let relay_url = relay_url.trim();
        if relay_url.is_empty() {
            return Err(ConfigError::Empty(RELAY_URL_VAR));
        }
        let parsed = Url::parse(relay_url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(ConfigError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let room = room
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_ROOM);

        Ok(Self {
            relay_url: relay_url.to_string(),
            room: room.to_string(),
        })
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration baked in at compile time (for builds without a
    /// process environment, such as the browser).
    pub fn from_build_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| match key {
            RELAY_URL_VAR => option_env!("SKETCHCAST_RELAY_URL").map(str::to_string),
            ROOM_VAR => option_env!("SKETCHCAST_ROOM").map(str::to_string),
            _ => None,
        })
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let relay_url = lookup(RELAY_URL_VAR).ok_or(ConfigError::Missing(RELAY_URL_VAR))?;
        let room = lookup(ROOM_VAR);
        Self::new(&relay_url, room.as_deref())
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    pub fn room(&self) -> &str {
        &self.room
    }
}
