//! # Watch Party Core
//!
//! Protocol logic for a small group watching one video in sync, with an
//! optional peer-to-peer screen broadcast. Everything here is free of I/O:
//! the relay and the client runtime feed events in and carry effects out.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 ClientCore                  │
//! ├─────────────────────────────────────────────┤
//! │  Negotiator          │  PlaybackSync        │
//! │  - Offer/answer      │  - play/pause/seek   │
//! │  - ICE queueing      │  - Reentrancy guard  │
//! │  - Failure restart   │  - Drift heartbeat   │
//! ├─────────────────────────────────────────────┤
//! │  Session model       │  SignalMessage       │
//! │  - One broadcaster   │  - JSON wire format  │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod media;
pub mod message;
pub mod negotiation;
pub mod playback;
pub mod session;
pub mod state;

pub use client::{ClientCore, Effect, Timer};
pub use config::{
    PartyConfig, DEFAULT_ICE_SERVERS, DISPLAY_NAME_KEY, DRIFT_TOLERANCE_SECS, HEARTBEAT_INTERVAL,
    ICE_CANDIDATE_POOL_SIZE, JOIN_GRACE, MAX_VIDEO_BITRATE_BPS, RECONNECT_DELAY,
    REMOTE_GUARD_WINDOW,
};
pub use error::{PartyError, PartyResult};
pub use event::{Command, CoreEvent};
pub use media::{
    IceConfig, IceConnectionState, MediaCapture, MediaEngine, MediaEvent, PeerConnection, StreamHandle,
};
pub use message::{IceCandidate, SdpKind, SessionDescription, SignalMessage};
pub use negotiation::{NegotiationSession, NegotiationState, Negotiator};
pub use playback::{PlaybackSync, Player, PlayerEvent, SyncState};
pub use session::{ClientId, ClientIdentity, Session, UserEntry, CLIENT_ID_LEN, DEFAULT_NAME_PREFIX};
pub use state::{ClientState, LinkStatus, MemoryNameStore, NameStore};

/// Party core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
