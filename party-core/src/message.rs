//! # Wire Protocol
//!
//! JSON messages exchanged over the transport link, one per frame, tagged by
//! `type`.
//!
//! ### Relay -> Client
//!
//! - `{"type": "init", "id": "...", "username": "...", "broadcaster": null}`
//! - `{"type": "user-list", "users": [{"id": "...", "name": "..."}], "broadcaster": "..."}`
//! - `{"type": "new-client", "id": "..."}`
//! - `{"type": "error", "code": "...", "message": "..."}`
//!
//! ### Client -> Relay
//!
//! - `{"type": "set-name", "name": "..."}`
//! - `{"type": "start-share"}` / `{"type": "stop-share"}`
//!
//! ### Directed (relayed to `to`, stamped with `from`)
//!
//! - `{"type": "offer", "offer": {"type": "offer", "sdp": "..."}, "to": "..."}`
//! - `{"type": "answer", "answer": {"type": "answer", "sdp": "..."}, "to": "..."}`
//! - `{"type": "ice-candidate", "candidate": {"candidate": "...", "sdpMid": "0", "sdpMLineIndex": 0}, "to": "..."}`
//!
//! ### Broadcast (relayed to everyone else, stamped with `from`)
//!
//! - `{"type": "load", "url": "..."}`
//! - `{"type": "play"}` / `{"type": "pause"}`
//! - `{"type": "seek", "time": 12.5}`
//! - `{"type": "sync", "time": 12.5, "playing": true}`
//! - `{"type": "ready"}`

use serde::{Deserialize, Serialize};

use crate::{ClientId, PartyResult, UserEntry};

/// SDP type of a session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Offer from the initiating side.
    Offer,
    /// Answer from the responding side.
    Answer,
    /// Provisional answer.
    Pranswer,
    /// Rollback of a pending description.
    Rollback,
}

/// A media session description, shaped like the browser's `RTCSessionDescriptionInit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer.
    #[serde(rename = "type")]
    pub kind: SdpKind,
    /// Raw SDP text.
    pub sdp: String,
}

impl SessionDescription {
    /// Build an offer description.
    #[must_use]
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Build an answer description.
    #[must_use]
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// An ICE candidate, shaped like the browser's `RTCIceCandidateInit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate attribute line.
    pub candidate: String,
    /// Media stream identification tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index of the media line this candidate belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    /// Candidate with only the attribute line set.
    #[must_use]
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

/// Every message kind spoken over the transport link.
///
/// `from` is always stamped by the relay; a value supplied by a client is
/// overwritten. `to` names the recipient of directed messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// Sent only to a newly connected client.
    Init {
        /// The client's own id.
        id: ClientId,
        /// Default display name.
        username: String,
        /// Current broadcaster.
        broadcaster: Option<ClientId>,
    },
    /// Change the sender's display name.
    SetName {
        /// New display name.
        name: String,
    },
    /// Full session snapshot.
    UserList {
        /// Every connected client.
        users: Vec<UserEntry>,
        /// Current broadcaster.
        broadcaster: Option<ClientId>,
    },
    /// Someone connected.
    NewClient {
        /// Id of the new client.
        id: ClientId,
    },
    /// Claim the broadcaster slot.
    StartShare,
    /// Release the broadcaster slot.
    StopShare,
    /// Client finished processing its `init`.
    Ready {
        /// Sender.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
    },
    /// Session description offer.
    Offer {
        /// The offer.
        offer: SessionDescription,
        /// Recipient.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<ClientId>,
        /// Sender.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
    },
    /// Session description answer.
    Answer {
        /// The answer.
        answer: SessionDescription,
        /// Recipient.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<ClientId>,
        /// Sender.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
    },
    /// Trickled ICE candidate.
    IceCandidate {
        /// The candidate.
        candidate: IceCandidate,
        /// Recipient.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<ClientId>,
        /// Sender.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
    },
    /// Replace the video source.
    Load {
        /// Media URL.
        url: String,
        /// Sender.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
    },
    /// Start playback.
    Play {
        /// Sender.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
    },
    /// Pause playback.
    Pause {
        /// Sender.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
    },
    /// Jump to a position.
    Seek {
        /// Target media time in seconds.
        time: f64,
        /// Sender.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
    },
    /// Periodic drift reconciliation.
    Sync {
        /// Sender's media time in seconds.
        time: f64,
        /// Whether the sender is playing.
        playing: bool,
        /// Sender.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
    },
    /// Relay rejected a client frame.
    Error {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

impl SignalMessage {
    /// Decode one frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PartyError::Serialization`] for malformed JSON or unknown kinds.
    pub fn from_json(text: &str) -> PartyResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as one frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PartyError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> PartyResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The wire `type` tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::SetName { .. } => "set-name",
            Self::UserList { .. } => "user-list",
            Self::NewClient { .. } => "new-client",
            Self::StartShare => "start-share",
            Self::StopShare => "stop-share",
            Self::Ready { .. } => "ready",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::Load { .. } => "load",
            Self::Play { .. } => "play",
            Self::Pause { .. } => "pause",
            Self::Seek { .. } => "seek",
            Self::Sync { .. } => "sync",
            Self::Error { .. } => "error",
        }
    }

    /// Recipient of a directed message.
    #[must_use]
    pub fn to(&self) -> Option<&ClientId> {
        match self {
            Self::Offer { to, .. } | Self::Answer { to, .. } | Self::IceCandidate { to, .. } => {
                to.as_ref()
            }
            _ => None,
        }
    }

    /// Relay-stamped sender.
    #[must_use]
    pub fn from(&self) -> Option<&ClientId> {
        match self {
            Self::Offer { from, .. }
            | Self::Answer { from, .. }
            | Self::IceCandidate { from, .. }
            | Self::Ready { from }
            | Self::Load { from, .. }
            | Self::Play { from }
            | Self::Pause { from }
            | Self::Seek { from, .. }
            | Self::Sync { from, .. } => from.as_ref(),
            _ => None,
        }
    }

    /// Overwrite the sender with `sender`. No-op for kinds without a `from`.
    #[must_use]
    pub fn stamped(mut self, sender: &ClientId) -> Self {
        match &mut self {
            Self::Offer { from, .. }
            | Self::Answer { from, .. }
            | Self::IceCandidate { from, .. }
            | Self::Ready { from }
            | Self::Load { from, .. }
            | Self::Play { from }
            | Self::Pause { from }
            | Self::Seek { from, .. }
            | Self::Sync { from, .. } => *from = Some(sender.clone()),
            _ => {}
        }
        self
    }

    /// Offer, answer and ICE candidate go to a single named recipient.
    #[must_use]
    pub fn is_directed(&self) -> bool {
        matches!(
            self,
            Self::Offer { .. } | Self::Answer { .. } | Self::IceCandidate { .. }
        )
    }

    /// Kinds the relay rebroadcasts to every other client.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            Self::Ready { .. }
                | Self::Load { .. }
                | Self::Play { .. }
                | Self::Pause { .. }
                | Self::Seek { .. }
                | Self::Sync { .. }
        )
    }

    /// Kinds only the relay may originate.
    #[must_use]
    pub fn is_relay_only(&self) -> bool {
        matches!(
            self,
            Self::Init { .. } | Self::UserList { .. } | Self::NewClient { .. } | Self::Error { .. }
        )
    }
}
