use std::net::SocketAddr;
use std::path::PathBuf;

use crate::rate_limiter::RateLimiterOptions;
use crate::server_utils::parse_flag;
use crate::session_manager::SessionManagerOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// File-backed snapshot directory; `None` keeps snapshots in memory.
    pub snapshot_dir: Option<PathBuf>,
    /// Drive a passive gravity tick on every connection.
    pub gravity: bool,
    pub rate_limit: RateLimiterOptions,
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            snapshot_dir: None,
            gravity: false,
            rate_limit: RateLimiterOptions::default(),
            max_clients: SessionManagerOptions::default().max_clients,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let host = lookup("HOST")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.host);
        let port = lookup("PORT")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(defaults.port);
        let snapshot_dir = lookup("SNAPSHOT_DIR")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        let gravity = lookup("GRAVITY")
            .and_then(|value| parse_flag(&value))
            .unwrap_or(defaults.gravity);
        let capacity = lookup("RATE_LIMIT_CAPACITY")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(defaults.rate_limit.capacity);
        let window_ms = lookup("RATE_LIMIT_WINDOW_MS")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(defaults.rate_limit.window_ms);
        let max_clients = lookup("MAX_CLIENTS")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(defaults.max_clients);

        Self {
            host,
            port,
            snapshot_dir,
            gravity,
            rate_limit: RateLimiterOptions {
                capacity,
                window_ms,
            },
            max_clients,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.bind_addr().parse().ok()
    }

    pub fn session_options(&self) -> SessionManagerOptions {
        SessionManagerOptions {
            rate_limit: self.rate_limit,
            max_clients: self.max_clients,
            ..SessionManagerOptions::default()
        }
    }
}
