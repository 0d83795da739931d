//! Input validation for untrusted relay traffic.
//!
//! Every client frame is checked here before it touches the registry or is
//! forwarded to another client.

use party_core::SignalMessage;
use thiserror::Error;

/// Maximum length for display names, in characters.
pub const MAX_DISPLAY_NAME_LEN: usize = 64;
/// Maximum length for client ids.
pub const MAX_CLIENT_ID_LEN: usize = 64;
/// Maximum length for SDP offers/answers.
pub const MAX_SDP_LEN: usize = 65536; // 64KB should be plenty
/// Maximum length for ICE candidates.
pub const MAX_ICE_CANDIDATE_LEN: usize = 2048;
/// Maximum length for media URLs.
pub const MAX_URL_LEN: usize = 2048;
/// Maximum WebSocket message size.
pub const MAX_WS_MESSAGE_SIZE: usize = 1_048_576; // 1MB

/// Validation error types.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Display name is empty after trimming.
    #[error("name must not be empty")]
    NameEmpty,
    /// Display name exceeds maximum length.
    #[error("name too long (max {MAX_DISPLAY_NAME_LEN} chars)")]
    NameTooLong,
    /// Client id exceeds maximum length.
    #[error("client id too long (max {MAX_CLIENT_ID_LEN} chars)")]
    ClientIdTooLong,
    /// Client id is empty or contains invalid characters.
    #[error("client id contains invalid characters")]
    ClientIdInvalidChars,
    /// Directed message without a recipient.
    #[error("missing recipient")]
    MissingRecipient,
    /// SDP exceeds maximum length.
    #[error("SDP too long (max {MAX_SDP_LEN} bytes)")]
    SdpTooLong,
    /// ICE candidate exceeds maximum length.
    #[error("ICE candidate too long (max {MAX_ICE_CANDIDATE_LEN} bytes)")]
    IceCandidateTooLong,
    /// URL is empty.
    #[error("url must not be empty")]
    UrlEmpty,
    /// URL exceeds maximum length.
    #[error("url too long (max {MAX_URL_LEN} bytes)")]
    UrlTooLong,
    /// Media time is negative, NaN or infinite.
    #[error("invalid media time: {0}")]
    InvalidTime(f64),
    /// WebSocket message exceeds maximum size.
    #[error("message too large (max {MAX_WS_MESSAGE_SIZE} bytes)")]
    MessageTooLarge,
}

impl ValidationError {
    /// Field label used for metrics.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::NameEmpty | Self::NameTooLong => "name",
            Self::ClientIdTooLong | Self::ClientIdInvalidChars | Self::MissingRecipient => "to",
            Self::SdpTooLong => "sdp",
            Self::IceCandidateTooLong => "ice_candidate",
            Self::UrlEmpty | Self::UrlTooLong => "url",
            Self::InvalidTime(_) => "time",
            Self::MessageTooLarge => "message_size",
        }
    }
}

/// Check if a character is valid for IDs (ASCII alphanumeric, hyphen, or underscore).
fn is_valid_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Validate and normalize a display name.
///
/// Returns the trimmed name.
///
/// # Errors
///
/// Returns [`ValidationError::NameEmpty`] if nothing remains after trimming.
/// Returns [`ValidationError::NameTooLong`] if the name exceeds 64 characters.
pub fn validate_display_name(name: &str) -> Result<&str, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::NameEmpty);
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(ValidationError::NameTooLong);
    }
    Ok(trimmed)
}

/// Validate a client id.
///
/// Valid client ids:
/// - 1-64 characters
/// - ASCII alphanumeric, hyphen, underscore only
///
/// # Errors
///
/// Returns [`ValidationError::ClientIdTooLong`] if the id exceeds 64 characters.
/// Returns [`ValidationError::ClientIdInvalidChars`] if the id is empty or contains invalid characters.
pub fn validate_client_id(id: &str) -> Result<(), ValidationError> {
    if id.len() > MAX_CLIENT_ID_LEN {
        return Err(ValidationError::ClientIdTooLong);
    }
    if id.is_empty() || !id.chars().all(is_valid_id_char) {
        return Err(ValidationError::ClientIdInvalidChars);
    }
    Ok(())
}

/// Validate an SDP string.
///
/// # Errors
///
/// Returns [`ValidationError::SdpTooLong`] if the SDP exceeds 64KB.
pub fn validate_sdp(sdp: &str) -> Result<(), ValidationError> {
    if sdp.len() > MAX_SDP_LEN {
        return Err(ValidationError::SdpTooLong);
    }
    Ok(())
}

/// Validate an ICE candidate string.
///
/// # Errors
///
/// Returns [`ValidationError::IceCandidateTooLong`] if the candidate exceeds 2KB.
pub fn validate_ice_candidate(candidate: &str) -> Result<(), ValidationError> {
    if candidate.len() > MAX_ICE_CANDIDATE_LEN {
        return Err(ValidationError::IceCandidateTooLong);
    }
    Ok(())
}

/// Validate a media URL.
///
/// # Errors
///
/// Returns [`ValidationError::UrlEmpty`] or [`ValidationError::UrlTooLong`].
pub fn validate_url(url: &str) -> Result<(), ValidationError> {
    if url.trim().is_empty() {
        return Err(ValidationError::UrlEmpty);
    }
    if url.len() > MAX_URL_LEN {
        return Err(ValidationError::UrlTooLong);
    }
    Ok(())
}

/// Validate a media time in seconds.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTime`] for negative or non-finite values.
pub fn validate_media_time(time: f64) -> Result<(), ValidationError> {
    if !time.is_finite() || time < 0.0 {
        return Err(ValidationError::InvalidTime(time));
    }
    Ok(())
}

/// Validate WebSocket message size.
///
/// # Errors
///
/// Returns [`ValidationError::MessageTooLarge`] if the message exceeds 1MB.
pub fn validate_message_size(size: usize) -> Result<(), ValidationError> {
    if size > MAX_WS_MESSAGE_SIZE {
        return Err(ValidationError::MessageTooLarge);
    }
    Ok(())
}

fn validate_recipient(to: Option<&party_core::ClientId>) -> Result<(), ValidationError> {
    match to {
        Some(id) => validate_client_id(id.as_str()),
        None => Err(ValidationError::MissingRecipient),
    }
}

/// Validate the payload of a client message.
///
/// # Errors
///
/// Returns the first field that fails its check.
pub fn validate_signal(message: &SignalMessage) -> Result<(), ValidationError> {
    match message {
        SignalMessage::SetName { name } => validate_display_name(name).map(|_| ()),
        SignalMessage::Offer { offer, to, .. } => {
            validate_recipient(to.as_ref())?;
            validate_sdp(&offer.sdp)
        }
        SignalMessage::Answer { answer, to, .. } => {
            validate_recipient(to.as_ref())?;
            validate_sdp(&answer.sdp)
        }
        SignalMessage::IceCandidate { candidate, to, .. } => {
            validate_recipient(to.as_ref())?;
            validate_ice_candidate(&candidate.candidate)
        }
        SignalMessage::Load { url, .. } => validate_url(url),
        SignalMessage::Seek { time, .. } | SignalMessage::Sync { time, .. } => {
            validate_media_time(*time)
        }
        _ => Ok(()),
    }
}
