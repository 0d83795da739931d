//! Media collaborator interfaces.
//!
//! The core never touches codecs or sockets itself. A peer media engine
//! (browser bindings, `webrtc-rs`, ...) and a screen capture source plug in
//! through these traits, and report asynchronous happenings back as
//! [`MediaEvent`]s.

use serde::{Deserialize, Serialize};

use crate::{ClientId, IceCandidate, PartyResult, SessionDescription};

/// Handle to a local or remote media stream.
///
/// Equality is identity: two handles are the same stream when their ids
/// match, regardless of what the stream carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    id: String,
}

impl StreamHandle {
    /// Wrap an engine-assigned stream id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Engine-assigned stream id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// NAT traversal settings applied to every peer session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IceConfig {
    /// STUN/TURN server URLs.
    pub servers: Vec<String>,
    /// Candidates to gather before negotiation starts.
    pub candidate_pool_size: u8,
}

/// Transport-level connectivity check state of one peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    /// Gathering has not started.
    New,
    /// Checks in progress.
    Checking,
    /// A usable pair was found.
    Connected,
    /// Checks finished.
    Completed,
    /// Connectivity lost, may recover.
    Disconnected,
    /// Connectivity checks failed.
    Failed,
    /// Session closed.
    Closed,
}

/// One peer media session inside the engine.
pub trait PeerConnection {
    /// Generate a local offer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PartyError::Media`] if the engine cannot produce one.
    fn create_offer(&mut self) -> PartyResult<SessionDescription>;

    /// Generate a local answer to the applied remote offer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PartyError::Media`] if no remote offer is applied.
    fn create_answer(&mut self) -> PartyResult<SessionDescription>;

    /// Apply a local description.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PartyError::Media`] if the engine rejects it.
    fn set_local_description(&mut self, description: &SessionDescription) -> PartyResult<()>;

    /// Apply the remote description.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PartyError::Media`] if the engine rejects it.
    fn set_remote_description(&mut self, description: &SessionDescription) -> PartyResult<()>;

    /// Apply a remote ICE candidate.
    ///
    /// # Errors
    ///
    /// Returns an error if the candidate is malformed or arrived too late.
    fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> PartyResult<()>;

    /// Cap outgoing video to `bps` bits per second.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PartyError::Media`] if the sender parameters cannot be changed.
    fn set_max_video_bitrate(&mut self, bps: u32) -> PartyResult<()>;

    /// Release the session and its media resources.
    fn close(&mut self);
}

/// Factory for peer media sessions.
pub trait MediaEngine {
    /// Session type produced by this engine.
    type Connection: PeerConnection;

    /// Create a session toward `peer` using `ice`, sending `local_stream`
    /// if given.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PartyError::Media`] if the engine cannot allocate a session.
    fn create_connection(
        &mut self,
        peer: &ClientId,
        ice: &IceConfig,
        local_stream: Option<&StreamHandle>,
    ) -> PartyResult<Self::Connection>;
}

/// Screen capture source.
pub trait MediaCapture {
    /// Acquire a local stream to broadcast.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PartyError::MediaAcquisitionDenied`] when permission is refused.
    fn acquire(&mut self) -> PartyResult<StreamHandle>;

    /// Stop every track of `stream`.
    fn release(&mut self, stream: &StreamHandle);
}

/// Asynchronous notifications from the media engine and capture source.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// The engine gathered a local candidate for `peer`.
    LocalCandidate {
        /// Remote peer.
        peer: ClientId,
        /// Gathered candidate.
        candidate: IceCandidate,
    },
    /// Connectivity check state of the session with `peer` changed.
    ConnectivityChanged {
        /// Remote peer.
        peer: ClientId,
        /// New state.
        state: IceConnectionState,
    },
    /// A remote track arrived on the session with `peer`.
    TrackReceived {
        /// Remote peer.
        peer: ClientId,
        /// Stream the track belongs to.
        stream: StreamHandle,
    },
    /// The local capture stream ended (user stopped it outside the app).
    CaptureEnded,
}
