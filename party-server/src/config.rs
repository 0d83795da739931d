//! Relay configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8000;
/// Default directory served at `/`.
pub const DEFAULT_STATIC_DIR: &str = "static";
/// Default burst capacity for rate limiting (messages).
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 100;
/// Default sustained rate for rate limiting (messages per second).
pub const DEFAULT_RATE_LIMIT_SUSTAINED: u32 = 10;

/// Relay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: IpAddr,
    /// Port to bind.
    pub port: u16,
    /// Directory holding the web UI.
    pub static_dir: PathBuf,
    /// Per-connection burst capacity.
    pub rate_limit_burst: u32,
    /// Per-connection sustained messages per second.
    pub rate_limit_sustained: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            rate_limit_sustained: DEFAULT_RATE_LIMIT_SUSTAINED,
        }
    }
}

impl ServerConfig {
    /// Build a configuration from environment variables or defaults.
    ///
    /// Environment variables:
    /// - `PARTY_HOST`: bind address (default: 0.0.0.0)
    /// - `PARTY_PORT`: bind port (default: 8000)
    /// - `PARTY_STATIC_DIR`: web UI directory (default: static)
    /// - `WS_RATE_LIMIT_BURST`: Burst capacity (default: 100)
    /// - `WS_RATE_LIMIT_SUSTAINED`: Sustained rate per second (default: 10)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_parse("PARTY_HOST").unwrap_or(defaults.host),
            port: env_parse("PARTY_PORT").unwrap_or(defaults.port),
            static_dir: std::env::var("PARTY_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            rate_limit_burst: env_parse("WS_RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            rate_limit_sustained: env_parse("WS_RATE_LIMIT_SUSTAINED")
                .unwrap_or(defaults.rate_limit_sustained),
        }
    }

    /// Socket address to bind.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
