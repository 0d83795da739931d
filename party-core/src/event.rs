//! Events for the UI layer and commands it sends back.

use serde::Serialize;

use crate::{ClientId, ClientIdentity, LinkStatus, StreamHandle, SyncState};

/// Notification for the UI collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// Transport link status changed.
    ConnectionStatus(LinkStatus),
    /// The relay assigned this client its identity.
    IdentityAssigned {
        /// Our id.
        id: ClientId,
        /// Our display name.
        name: String,
    },
    /// A new session snapshot arrived.
    UserListChanged(Vec<ClientIdentity>),
    /// The broadcaster slot changed hands or was cleared.
    BroadcasterChanged(Option<ClientId>),
    /// A remote media stream became available.
    RemoteTrackReceived {
        /// Peer sending the stream.
        peer: ClientId,
        /// The stream.
        stream: StreamHandle,
    },
    /// Local playback position or play state changed.
    PlaybackStateChanged(SyncState),
    /// A share attempt failed. Not retried.
    ShareFailed(String),
}

impl CoreEvent {
    /// Event name as exposed to UI bindings.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionStatus(_) => "connection-status",
            Self::IdentityAssigned { .. } => "identity-assigned",
            Self::UserListChanged(_) => "user-list-changed",
            Self::BroadcasterChanged(_) => "broadcaster-changed",
            Self::RemoteTrackReceived { .. } => "remote-track-received",
            Self::PlaybackStateChanged(_) => "playback-state-changed",
            Self::ShareFailed(_) => "share-failed",
        }
    }
}

/// Action requested by the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    /// Start playback.
    Play,
    /// Pause playback.
    Pause,
    /// Jump to a position in seconds.
    Seek {
        /// Target time.
        time: f64,
    },
    /// Load a new video source.
    Load {
        /// Media URL.
        url: String,
    },
    /// Start broadcasting the screen.
    StartShare,
    /// Stop broadcasting.
    StopShare,
    /// Choose a display name.
    SetName {
        /// New name.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(
            CoreEvent::ConnectionStatus(LinkStatus::Open).name(),
            "connection-status"
        );
        assert_eq!(CoreEvent::ShareFailed("x".into()).name(), "share-failed");
        assert_eq!(
            CoreEvent::BroadcasterChanged(None).name(),
            "broadcaster-changed"
        );
    }

    #[test]
    fn test_command_serialization() {
        let json = serde_json::to_string(&Command::Seek { time: 4.5 }).expect("should serialize");
        assert_eq!(json, r#"{"command":"seek","time":4.5}"#);
    }
}
