//! Protocol timing and connectivity configuration.

use std::time::Duration;

use crate::media::IceConfig;

/// Delay before the transport link retries after an abnormal close.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);
/// Interval between heartbeat `sync` messages while playing.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Drift in seconds beyond which a `sync` forces a seek.
pub const DRIFT_TOLERANCE_SECS: f64 = 1.5;
/// How long outbound playback messages stay suppressed after a remote change.
pub const REMOTE_GUARD_WINDOW: Duration = Duration::from_millis(100);
/// Fallback wait for a joining peer's `ready` before offering anyway.
pub const JOIN_GRACE: Duration = Duration::from_secs(2);
/// Ceiling applied to outgoing broadcast video, in bits per second.
pub const MAX_VIDEO_BITRATE_BPS: u32 = 1_500_000;

/// STUN servers used for NAT traversal unless overridden.
pub const DEFAULT_ICE_SERVERS: [&str; 4] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
    "stun:stun.services.mozilla.com",
];
/// ICE candidates gathered ahead of a session being negotiated.
pub const ICE_CANDIDATE_POOL_SIZE: u8 = 10;

/// Key under which the chosen display name is persisted.
pub const DISPLAY_NAME_KEY: &str = "watch-party-name";

/// Tunable client-side timings.
#[derive(Debug, Clone, PartialEq)]
pub struct PartyConfig {
    /// Transport reconnect backoff.
    pub reconnect_delay: Duration,
    /// Heartbeat period.
    pub heartbeat_interval: Duration,
    /// Drift tolerance in seconds.
    pub drift_tolerance: f64,
    /// Reentrancy guard window.
    pub guard_window: Duration,
    /// Join readiness fallback.
    pub join_grace: Duration,
    /// Broadcast video ceiling in bits per second.
    pub max_video_bitrate: u32,
    /// STUN/TURN server URLs handed to every peer session.
    pub ice_servers: Vec<String>,
    /// Pre-gathered ICE candidate pool size.
    pub ice_candidate_pool_size: u8,
}

impl Default for PartyConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: RECONNECT_DELAY,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            drift_tolerance: DRIFT_TOLERANCE_SECS,
            guard_window: REMOTE_GUARD_WINDOW,
            join_grace: JOIN_GRACE,
            max_video_bitrate: MAX_VIDEO_BITRATE_BPS,
            ice_servers: DEFAULT_ICE_SERVERS.iter().map(ToString::to_string).collect(),
            ice_candidate_pool_size: ICE_CANDIDATE_POOL_SIZE,
        }
    }
}

impl PartyConfig {
    /// Build a configuration from environment variables or defaults.
    ///
    /// Environment variables:
    /// - `PARTY_RECONNECT_MS`: reconnect backoff (default: 3000)
    /// - `PARTY_HEARTBEAT_MS`: heartbeat interval (default: 5000)
    /// - `PARTY_JOIN_GRACE_MS`: join readiness fallback (default: 2000)
    /// - `PARTY_ICE_SERVERS`: comma-separated ICE server URLs (default: public
    ///   STUN servers). Set but empty means host candidates only.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            reconnect_delay: env_millis("PARTY_RECONNECT_MS").unwrap_or(defaults.reconnect_delay),
            heartbeat_interval: env_millis("PARTY_HEARTBEAT_MS")
                .unwrap_or(defaults.heartbeat_interval),
            join_grace: env_millis("PARTY_JOIN_GRACE_MS").unwrap_or(defaults.join_grace),
            ice_servers: std::env::var("PARTY_ICE_SERVERS")
                .map_or(defaults.ice_servers.clone(), |v| parse_ice_servers(&v)),
            ..defaults
        }
    }

    /// Connectivity settings for the media engine.
    #[must_use]
    pub fn ice(&self) -> IceConfig {
        IceConfig {
            servers: self.ice_servers.clone(),
            candidate_pool_size: self.ice_candidate_pool_size,
        }
    }
}

fn parse_ice_servers(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
}
