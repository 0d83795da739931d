//! Error types for watch party operations.

use thiserror::Error;

use crate::ClientId;

/// Result type for watch party operations.
pub type PartyResult<T> = Result<T, PartyError>;

/// Errors that can occur in the client-side core.
///
/// None of these are fatal. The transport link reconnects on its own and the
/// negotiator renegotiates failed peers, so callers log and carry on.
#[derive(Debug, Error)]
pub enum PartyError {
    /// A send was attempted while the transport link was not open.
    #[error("Transport unavailable: not connected")]
    TransportUnavailable,

    /// An answer or candidate arrived for a peer with no matching session state.
    #[error("Negotiation mismatch with peer {peer}: {reason}")]
    NegotiationMismatch {
        /// Remote peer the message came from.
        peer: ClientId,
        /// What did not match.
        reason: String,
    },

    /// Screen capture permission was refused.
    #[error("Media acquisition denied: {0}")]
    MediaAcquisitionDenied(String),

    /// A malformed or late ICE candidate could not be applied.
    #[error("Failed to apply ICE candidate from {peer}: {reason}")]
    CandidateApplicationFailed {
        /// Remote peer the candidate came from.
        peer: ClientId,
        /// Reason reported by the media engine.
        reason: String,
    },

    /// The peer media engine reported an error.
    #[error("Media engine error: {0}")]
    Media(String),

    /// Wire encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PartyError {
    /// Build a [`PartyError::NegotiationMismatch`].
    #[must_use]
    pub fn mismatch(peer: &ClientId, reason: impl Into<String>) -> Self {
        Self::NegotiationMismatch {
            peer: peer.clone(),
            reason: reason.into(),
        }
    }
}
