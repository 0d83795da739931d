//! Per-peer media session negotiation.
//!
//! The broadcaster is always the offer initiator. Each remote peer gets one
//! [`NegotiationSession`]; renegotiation builds a fresh session and swaps it
//! in, so the previous one is closed when it is dropped and never observed
//! half-updated.
//!
//! ```text
//! Idle ──create_offer──▶ OfferSent ──answer──▶ Connected
//! Idle ──offer──▶ OfferReceived ──local answer applied──▶ Connected
//! Connected ──ice failed──▶ Failed ──(broadcaster) fresh offer──▶ OfferSent
//! any ──drop / peer gone──▶ Closed
//! ```

use std::collections::{HashMap, HashSet};

use crate::{
    ClientId, IceCandidate, IceConfig, IceConnectionState, MediaEngine, PartyError, PartyResult,
    PeerConnection, Session, SessionDescription, SignalMessage, StreamHandle,
};

/// Lifecycle of one peer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationState {
    /// Allocated, nothing exchanged.
    Idle,
    /// Local offer applied and sent, waiting for the answer.
    OfferSent {
        /// The offer we sent.
        local: SessionDescription,
    },
    /// Remote offer applied, local answer not yet applied.
    OfferReceived {
        /// The offer we received.
        remote: SessionDescription,
    },
    /// Both descriptions applied.
    Connected {
        /// Our description.
        local: SessionDescription,
        /// Their description.
        remote: SessionDescription,
    },
    /// Connectivity checks failed.
    Failed,
    /// Released.
    Closed,
}

impl NegotiationState {
    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::OfferSent { .. } => "offer-sent",
            Self::OfferReceived { .. } => "offer-received",
            Self::Connected { .. } => "connected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }

    fn has_remote_description(&self) -> bool {
        matches!(self, Self::OfferReceived { .. } | Self::Connected { .. })
    }
}

/// Negotiation state with one remote peer.
///
/// Closing the underlying connection happens on drop.
#[derive(Debug)]
pub struct NegotiationSession<C: PeerConnection> {
    peer: ClientId,
    connection: C,
    state: NegotiationState,
    pending_candidates: Vec<IceCandidate>,
}

impl<C: PeerConnection> NegotiationSession<C> {
    fn new(peer: ClientId, connection: C) -> Self {
        Self {
            peer,
            connection,
            state: NegotiationState::Idle,
            pending_candidates: Vec::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    /// Candidates waiting for the remote description.
    #[must_use]
    pub fn pending_candidates(&self) -> &[IceCandidate] {
        &self.pending_candidates
    }

    fn apply_candidate(&mut self, candidate: &IceCandidate) -> PartyResult<()> {
        self.connection
            .add_ice_candidate(candidate)
            .map_err(|e| PartyError::CandidateApplicationFailed {
                peer: self.peer.clone(),
                reason: e.to_string(),
            })
    }

    /// Apply queued candidates in arrival order. Failures are logged only.
    fn flush_candidates(&mut self) {
        let pending = std::mem::take(&mut self.pending_candidates);
        if !pending.is_empty() {
            tracing::debug!(
                peer_id = %self.peer,
                count = pending.len(),
                "Flushing queued ICE candidates"
            );
        }
        for candidate in &pending {
            if let Err(e) = self.apply_candidate(candidate) {
                tracing::warn!(peer_id = %self.peer, "{}", e);
            }
        }
    }
}

impl<C: PeerConnection> Drop for NegotiationSession<C> {
    fn drop(&mut self) {
        if self.state != NegotiationState::Closed {
            self.connection.close();
            self.state = NegotiationState::Closed;
        }
    }
}

/// Drives offer/answer/candidate exchange with every remote peer.
///
/// Outbound signaling accumulates in an outbox drained with
/// [`Negotiator::drain_outbound`].
pub struct Negotiator<E: MediaEngine> {
    engine: E,
    sessions: HashMap<ClientId, NegotiationSession<E::Connection>>,
    local_stream: Option<StreamHandle>,
    awaiting_ready: HashSet<ClientId>,
    attached_streams: HashMap<ClientId, StreamHandle>,
    max_video_bitrate: u32,
    ice: IceConfig,
    outbox: Vec<SignalMessage>,
}

impl<E: MediaEngine> Negotiator<E> {
    /// Create a negotiator on top of `engine`. Every session it opens uses
    /// `ice` and caps broadcast video at `max_video_bitrate`.
    #[must_use]
    pub fn new(engine: E, ice: IceConfig, max_video_bitrate: u32) -> Self {
        Self {
            engine,
            sessions: HashMap::new(),
            local_stream: None,
            awaiting_ready: HashSet::new(),
            attached_streams: HashMap::new(),
            max_video_bitrate,
            ice,
            outbox: Vec::new(),
        }
    }

    /// The media engine.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Whether we are the broadcaster.
    #[must_use]
    pub fn is_broadcasting(&self) -> bool {
        self.local_stream.is_some()
    }

    /// The stream being broadcast.
    #[must_use]
    pub fn local_stream(&self) -> Option<&StreamHandle> {
        self.local_stream.as_ref()
    }

    /// State of the session with `peer`.
    #[must_use]
    pub fn state(&self, peer: &ClientId) -> Option<&NegotiationState> {
        self.sessions.get(peer).map(NegotiationSession::state)
    }

    /// Session with `peer`.
    #[must_use]
    pub fn session(&self, peer: &ClientId) -> Option<&NegotiationSession<E::Connection>> {
        self.sessions.get(peer)
    }

    /// Number of live peer sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether an offer to `peer` is held back until it reports ready.
    #[must_use]
    pub fn is_awaiting_ready(&self, peer: &ClientId) -> bool {
        self.awaiting_ready.contains(peer)
    }

    /// Take all signaling produced since the last call.
    pub fn drain_outbound(&mut self) -> Vec<SignalMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Begin broadcasting `stream` and offer it to every peer present.
    pub fn start_broadcast(&mut self, stream: StreamHandle, peers: impl IntoIterator<Item = ClientId>) {
        tracing::info!(stream_id = %stream.id(), "Starting broadcast");
        self.local_stream = Some(stream);
        for peer in peers {
            if let Err(e) = self.create_offer(&peer) {
                tracing::warn!(peer_id = %peer, "Failed to offer broadcast: {}", e);
            }
        }
    }

    /// Stop broadcasting and release every peer session.
    ///
    /// Returns the stream that was being broadcast so the caller can release it.
    pub fn stop_broadcast(&mut self) -> Option<StreamHandle> {
        let stream = self.local_stream.take()?;
        tracing::info!(
            stream_id = %stream.id(),
            sessions = self.sessions.len(),
            "Stopping broadcast"
        );
        self.awaiting_ready.clear();
        self.sessions.clear();
        Some(stream)
    }

    /// A client joined. While broadcasting, its offer waits for readiness.
    ///
    /// Returns true if the caller should arm the join grace timer.
    pub fn peer_joined(&mut self, peer: &ClientId) -> bool {
        if !self.is_broadcasting() {
            return false;
        }
        tracing::debug!(peer_id = %peer, "Waiting for new peer to report ready");
        self.awaiting_ready.insert(peer.clone())
    }

    /// A joining client reported ready.
    ///
    /// # Errors
    ///
    /// Returns an error if the media engine cannot produce the offer.
    pub fn peer_ready(&mut self, peer: &ClientId) -> PartyResult<()> {
        self.offer_if_awaiting(peer)
    }

    /// The join grace timer for `peer` fired.
    ///
    /// # Errors
    ///
    /// Returns an error if the media engine cannot produce the offer.
    pub fn join_grace_elapsed(&mut self, peer: &ClientId) -> PartyResult<()> {
        self.offer_if_awaiting(peer)
    }

    fn offer_if_awaiting(&mut self, peer: &ClientId) -> PartyResult<()> {
        if self.awaiting_ready.remove(peer) && self.is_broadcasting() {
            self.create_offer(peer)
        } else {
            Ok(())
        }
    }

    /// Build a fresh session toward `peer` and send it an offer.
    ///
    /// # Errors
    ///
    /// Returns [`PartyError::NegotiationMismatch`] when not broadcasting, or
    /// the media engine's error.
    pub fn create_offer(&mut self, peer: &ClientId) -> PartyResult<()> {
        if !self.is_broadcasting() {
            return Err(PartyError::mismatch(
                peer,
                "only the broadcaster initiates negotiation",
            ));
        }
        let connection = self
            .engine
            .create_connection(peer, &self.ice, self.local_stream.as_ref())?;
        let mut session = NegotiationSession::new(peer.clone(), connection);
        let offer = session.connection.create_offer()?;
        session.connection.set_local_description(&offer)?;
        session.state = NegotiationState::OfferSent {
            local: offer.clone(),
        };

        self.install(peer, session);
        tracing::info!(peer_id = %peer, "Sent offer");
        self.outbox.push(SignalMessage::Offer {
            offer,
            to: Some(peer.clone()),
            from: None,
        });
        Ok(())
    }

    /// An offer arrived from `from`. Any existing session is discarded first.
    ///
    /// # Errors
    ///
    /// Returns the media engine's error; no session is kept in that case.
    pub fn handle_offer(&mut self, from: &ClientId, offer: SessionDescription) -> PartyResult<()> {
        if self.sessions.remove(from).is_some() {
            tracing::debug!(peer_id = %from, "Discarding previous session for new offer");
        }
        let connection = self
            .engine
            .create_connection(from, &self.ice, self.local_stream.as_ref())?;
        let mut session = NegotiationSession::new(from.clone(), connection);

        session.connection.set_remote_description(&offer)?;
        session.state = NegotiationState::OfferReceived {
            remote: offer.clone(),
        };
        session.flush_candidates();

        let answer = session.connection.create_answer()?;
        session.connection.set_local_description(&answer)?;
        session.state = NegotiationState::Connected {
            local: answer.clone(),
            remote: offer,
        };

        self.install(from, session);
        tracing::info!(peer_id = %from, "Answered offer");
        self.outbox.push(SignalMessage::Answer {
            answer,
            to: Some(from.clone()),
            from: None,
        });
        Ok(())
    }

    /// An answer arrived from `from`.
    ///
    /// If the engine rejects the answer while broadcasting, the session is
    /// replaced with a fresh offer. Otherwise the session is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PartyError::NegotiationMismatch`] if no offer to `from` is
    /// outstanding, or the media engine's error.
    pub fn handle_answer(&mut self, from: &ClientId, answer: SessionDescription) -> PartyResult<()> {
        let max_bitrate = self.max_video_bitrate;
        let broadcasting = self.is_broadcasting();
        let Some(session) = self.sessions.get_mut(from) else {
            return Err(PartyError::mismatch(from, "answer without a session"));
        };
        let NegotiationState::OfferSent { local } = &session.state else {
            return Err(PartyError::mismatch(
                from,
                format!("answer while {}", session.state.name()),
            ));
        };
        let local = local.clone();

        if let Err(e) = session.connection.set_remote_description(&answer) {
            session.state = NegotiationState::Failed;
            if broadcasting {
                tracing::warn!(peer_id = %from, "Answer rejected ({}), renegotiating", e);
                return self.create_offer(from);
            }
            self.remove_peer(from);
            return Err(e);
        }
        session.state = NegotiationState::Connected {
            local,
            remote: answer,
        };
        session.flush_candidates();
        tracing::info!(peer_id = %from, "Peer session connected");

        if broadcasting {
            if let Err(e) = session.connection.set_max_video_bitrate(max_bitrate) {
                tracing::warn!(peer_id = %from, "Failed to cap video bitrate: {}", e);
            }
        }
        Ok(())
    }

    /// A remote ICE candidate arrived from `from`.
    ///
    /// Candidates that beat the remote description are queued.
    ///
    /// # Errors
    ///
    /// Returns [`PartyError::NegotiationMismatch`] if there is no session with
    /// `from`, or [`PartyError::CandidateApplicationFailed`] if the engine
    /// rejects the candidate. Neither affects the session.
    pub fn handle_candidate(&mut self, from: &ClientId, candidate: IceCandidate) -> PartyResult<()> {
        let Some(session) = self.sessions.get_mut(from) else {
            return Err(PartyError::mismatch(from, "candidate without a session"));
        };
        if session.state.has_remote_description() {
            session.apply_candidate(&candidate)
        } else {
            tracing::debug!(peer_id = %from, "Queueing ICE candidate until remote description");
            session.pending_candidates.push(candidate);
            Ok(())
        }
    }

    /// The engine gathered a local candidate for `peer`.
    pub fn local_candidate(&mut self, peer: &ClientId, candidate: IceCandidate) {
        if !self.sessions.contains_key(peer) {
            tracing::debug!(peer_id = %peer, "Dropping local candidate for closed session");
            return;
        }
        self.outbox.push(SignalMessage::IceCandidate {
            candidate,
            to: Some(peer.clone()),
            from: None,
        });
    }

    /// Connectivity of the session with `peer` changed.
    ///
    /// On failure the broadcaster renegotiates from scratch; viewers wait for
    /// the broadcaster's fresh offer.
    ///
    /// # Errors
    ///
    /// Returns the media engine's error if the restart offer cannot be made.
    pub fn connectivity_changed(
        &mut self,
        peer: &ClientId,
        state: IceConnectionState,
    ) -> PartyResult<()> {
        tracing::debug!(peer_id = %peer, state = ?state, "Connectivity changed");
        if state != IceConnectionState::Failed {
            return Ok(());
        }
        let Some(session) = self.sessions.get_mut(peer) else {
            return Ok(());
        };
        session.state = NegotiationState::Failed;

        if self.is_broadcasting() {
            tracing::warn!(peer_id = %peer, "Connectivity failed, renegotiating");
            self.create_offer(peer)
        } else {
            tracing::info!(peer_id = %peer, "Connectivity failed, waiting for a fresh offer");
            Ok(())
        }
    }

    /// A remote track arrived from `peer`.
    ///
    /// Returns the stream if it is newly attached, or `None` for a repeat
    /// notification of the stream already attached for that peer.
    pub fn track_received(&mut self, peer: &ClientId, stream: StreamHandle) -> Option<StreamHandle> {
        if !self.sessions.contains_key(peer) {
            tracing::debug!(peer_id = %peer, "Ignoring track for unknown session");
            return None;
        }
        if self.attached_streams.get(peer) == Some(&stream) {
            return None;
        }
        tracing::info!(peer_id = %peer, stream_id = %stream.id(), "Remote stream attached");
        self.attached_streams.insert(peer.clone(), stream.clone());
        Some(stream)
    }

    /// Release everything tied to `peer`.
    pub fn remove_peer(&mut self, peer: &ClientId) {
        self.awaiting_ready.remove(peer);
        self.attached_streams.remove(peer);
        if self.sessions.remove(peer).is_some() {
            tracing::info!(peer_id = %peer, "Closed peer session");
        }
    }

    /// Drop sessions that the latest snapshot no longer justifies.
    ///
    /// Peers that left are always released. A viewer also releases sessions
    /// with anyone other than the current broadcaster.
    pub fn retain_peers(&mut self, session: &Session) {
        let broadcasting = self.is_broadcasting();
        let stale: Vec<ClientId> = self
            .sessions
            .keys()
            .chain(self.awaiting_ready.iter())
            .filter(|peer| {
                !session.contains(peer) || (!broadcasting && session.broadcaster() != Some(*peer))
            })
            .cloned()
            .collect();
        for peer in stale {
            self.remove_peer(&peer);
        }
    }

    fn install(&mut self, peer: &ClientId, session: NegotiationSession<E::Connection>) {
        self.attached_streams.remove(peer);
        // The replaced session, if any, closes when dropped here.
        self.sessions.insert(peer.clone(), session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::fake::{Call, FakeEngine};

    fn id(s: &str) -> ClientId {
        ClientId::from(s)
    }

    fn broadcaster_on(engine: FakeEngine) -> Negotiator<FakeEngine> {
        let mut negotiator = Negotiator::new(engine, IceConfig::default(), 1_500_000);
        negotiator.start_broadcast(StreamHandle::new("screen"), Vec::new());
        negotiator
    }

    fn broadcaster() -> Negotiator<FakeEngine> {
        broadcaster_on(FakeEngine::default())
    }

    fn viewer() -> Negotiator<FakeEngine> {
        Negotiator::new(FakeEngine::default(), IceConfig::default(), 1_500_000)
    }

    fn candidate_calls(engine: &FakeEngine) -> Vec<String> {
        engine
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Candidate(_, c) => Some(c),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_broadcast_offers_every_peer() {
        let mut negotiator = viewer();
        negotiator.start_broadcast(StreamHandle::new("screen"), vec![id("a"), id("b")]);

        let out = negotiator.drain_outbound();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|m| m.kind() == "offer"));
        assert!(matches!(
            negotiator.state(&id("a")),
            Some(NegotiationState::OfferSent { .. })
        ));
        assert!(negotiator
            .engine()
            .calls()
            .contains(&Call::Create(id("b"), Some("screen".into()))));
    }

    #[test]
    fn test_viewer_never_initiates() {
        let mut negotiator = viewer();
        let err = negotiator.create_offer(&id("a")).unwrap_err();
        assert!(matches!(err, PartyError::NegotiationMismatch { .. }));
        assert!(negotiator.drain_outbound().is_empty());
        assert!(!negotiator.peer_joined(&id("a")));
    }

    #[test]
    fn test_offer_answer_connects_and_caps_bitrate() {
        let mut negotiator = broadcaster();
        negotiator.create_offer(&id("v")).expect("offer");
        negotiator
            .handle_answer(&id("v"), SessionDescription::answer("a"))
            .expect("answer");

        assert!(matches!(
            negotiator.state(&id("v")),
            Some(NegotiationState::Connected { .. })
        ));
        assert!(negotiator
            .engine()
            .calls()
            .contains(&Call::Bitrate(id("v"), 1_500_000)));
    }

    #[test]
    fn test_rejected_answer_restarts_negotiation() {
        let mut negotiator = broadcaster_on(FakeEngine {
            reject_remote: true,
            ..FakeEngine::default()
        });
        negotiator.create_offer(&id("v")).expect("offer");
        negotiator.drain_outbound();

        negotiator
            .handle_answer(&id("v"), SessionDescription::answer("garbled"))
            .expect("restart");

        let out = negotiator.drain_outbound();
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], SignalMessage::Offer { to: Some(to), .. } if *to == id("v")));
        assert!(matches!(
            negotiator.state(&id("v")),
            Some(NegotiationState::OfferSent { .. })
        ));
        let creates = negotiator
            .engine()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Create(peer, _) if *peer == id("v")))
            .count();
        assert_eq!(creates, 2);
        assert!(!negotiator.engine().calls().contains(&Call::Bitrate(id("v"), 1_500_000)));
    }

    #[test]
    fn test_sessions_use_configured_ice_servers() {
        let ice = IceConfig {
            servers: vec!["stun:stun.example:3478".into()],
            candidate_pool_size: 10,
        };
        let mut negotiator = Negotiator::new(FakeEngine::default(), ice.clone(), 1_500_000);
        negotiator
            .handle_offer(&id("host"), SessionDescription::offer("o"))
            .expect("offer");
        negotiator.start_broadcast(StreamHandle::new("screen"), vec![id("a")]);

        assert_eq!(negotiator.engine().ice, vec![ice.clone(), ice]);
    }

    #[test]
    fn test_viewer_answers_offer() {
        let mut negotiator = viewer();
        negotiator
            .handle_offer(&id("host"), SessionDescription::offer("o"))
            .expect("offer");

        let out = negotiator.drain_outbound();
        assert_eq!(out.len(), 1);
        match &out[0] {
            SignalMessage::Answer { answer, to, .. } => {
                assert_eq!(to.as_ref(), Some(&id("host")));
                assert_eq!(answer.sdp, "answer-to-host");
            }
            other => panic!("Expected Answer, got {other:?}"),
        }
        assert!(matches!(
            negotiator.state(&id("host")),
            Some(NegotiationState::Connected { .. })
        ));
        // Viewers do not shape bitrate.
        assert!(!negotiator
            .engine()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Bitrate(..))));
    }

    #[test]
    fn test_repeat_offer_replaces_session() {
        let mut negotiator = viewer();
        negotiator
            .handle_offer(&id("host"), SessionDescription::offer("o1"))
            .expect("offer");
        negotiator
            .handle_offer(&id("host"), SessionDescription::offer("o2"))
            .expect("offer");

        let calls = negotiator.engine().calls();
        let creates = calls.iter().filter(|c| matches!(c, Call::Create(..))).count();
        assert_eq!(creates, 2);
        assert!(calls.contains(&Call::Close(id("host"))));
        assert_eq!(negotiator.session_count(), 1);
        match negotiator.state(&id("host")) {
            Some(NegotiationState::Connected { remote, .. }) => assert_eq!(remote.sdp, "o2"),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_answer_without_offer_is_mismatch() {
        let mut negotiator = broadcaster();
        let err = negotiator
            .handle_answer(&id("x"), SessionDescription::answer("a"))
            .unwrap_err();
        assert!(matches!(err, PartyError::NegotiationMismatch { .. }));

        negotiator.create_offer(&id("x")).expect("offer");
        negotiator
            .handle_answer(&id("x"), SessionDescription::answer("a"))
            .expect("answer");
        // A second answer finds the session already connected.
        let err = negotiator
            .handle_answer(&id("x"), SessionDescription::answer("a"))
            .unwrap_err();
        assert!(err.to_string().contains("connected"));
    }

    #[test]
    fn test_early_candidates_queue_and_flush_in_order() {
        let mut negotiator = broadcaster();
        negotiator.create_offer(&id("v")).expect("offer");
        negotiator
            .handle_candidate(&id("v"), IceCandidate::new("c1"))
            .expect("queued");
        negotiator
            .handle_candidate(&id("v"), IceCandidate::new("c2"))
            .expect("queued");
        assert_eq!(
            negotiator
                .session(&id("v"))
                .map(|s| s.pending_candidates().len()),
            Some(2)
        );
        assert!(candidate_calls(negotiator.engine()).is_empty());

        negotiator
            .handle_answer(&id("v"), SessionDescription::answer("a"))
            .expect("answer");

        assert_eq!(candidate_calls(negotiator.engine()), vec!["c1", "c2"]);
        assert_eq!(
            negotiator
                .session(&id("v"))
                .map(|s| s.pending_candidates().len()),
            Some(0)
        );
    }

    #[test]
    fn test_early_and_late_candidates_reach_same_state() {
        let mut early = broadcaster();
        early.create_offer(&id("v")).expect("offer");
        early.handle_candidate(&id("v"), IceCandidate::new("c1")).expect("queued");
        early.handle_answer(&id("v"), SessionDescription::answer("a")).expect("answer");

        let mut late = broadcaster();
        late.create_offer(&id("v")).expect("offer");
        late.handle_answer(&id("v"), SessionDescription::answer("a")).expect("answer");
        late.handle_candidate(&id("v"), IceCandidate::new("c1")).expect("applied");

        assert_eq!(early.state(&id("v")), late.state(&id("v")));
        assert_eq!(candidate_calls(early.engine()), candidate_calls(late.engine()));
    }

    #[test]
    fn test_bad_candidate_does_not_abort_session() {
        let mut negotiator = viewer();
        negotiator
            .handle_offer(&id("host"), SessionDescription::offer("o"))
            .expect("offer");
        let err = negotiator
            .handle_candidate(&id("host"), IceCandidate::new(""))
            .unwrap_err();
        assert!(matches!(err, PartyError::CandidateApplicationFailed { .. }));
        assert!(matches!(
            negotiator.state(&id("host")),
            Some(NegotiationState::Connected { .. })
        ));
    }

    #[test]
    fn test_candidate_without_session_is_mismatch() {
        let mut negotiator = viewer();
        let err = negotiator
            .handle_candidate(&id("nobody"), IceCandidate::new("c"))
            .unwrap_err();
        assert!(matches!(err, PartyError::NegotiationMismatch { .. }));
    }

    #[test]
    fn test_broadcaster_restarts_failed_peer_only() {
        let mut negotiator = broadcaster();
        negotiator.create_offer(&id("a")).expect("offer");
        negotiator.create_offer(&id("b")).expect("offer");
        negotiator.handle_answer(&id("a"), SessionDescription::answer("x")).expect("answer");
        negotiator.handle_answer(&id("b"), SessionDescription::answer("y")).expect("answer");
        negotiator.drain_outbound();

        negotiator
            .connectivity_changed(&id("a"), IceConnectionState::Failed)
            .expect("restart");

        let out = negotiator.drain_outbound();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to(), Some(&id("a")));
        assert!(matches!(
            negotiator.state(&id("a")),
            Some(NegotiationState::OfferSent { .. })
        ));
        assert!(matches!(
            negotiator.state(&id("b")),
            Some(NegotiationState::Connected { .. })
        ));

        // Bitrate is applied again after the renegotiated answer.
        negotiator.handle_answer(&id("a"), SessionDescription::answer("z")).expect("answer");
        let caps = negotiator
            .engine()
            .calls()
            .into_iter()
            .filter(|c| *c == Call::Bitrate(id("a"), 1_500_000))
            .count();
        assert_eq!(caps, 2);
    }

    #[test]
    fn test_viewer_waits_after_failure() {
        let mut negotiator = viewer();
        negotiator
            .handle_offer(&id("host"), SessionDescription::offer("o"))
            .expect("offer");
        negotiator.drain_outbound();

        negotiator
            .connectivity_changed(&id("host"), IceConnectionState::Failed)
            .expect("no restart");
        assert!(negotiator.drain_outbound().is_empty());
        assert_eq!(negotiator.state(&id("host")), Some(&NegotiationState::Failed));
    }

    #[test]
    fn test_duplicate_track_suppressed() {
        let mut negotiator = viewer();
        negotiator
            .handle_offer(&id("host"), SessionDescription::offer("o"))
            .expect("offer");

        let first = negotiator.track_received(&id("host"), StreamHandle::new("s1"));
        let repeat = negotiator.track_received(&id("host"), StreamHandle::new("s1"));
        let other = negotiator.track_received(&id("host"), StreamHandle::new("s2"));
        assert!(first.is_some());
        assert!(repeat.is_none());
        assert!(other.is_some());
    }

    #[test]
    fn test_renegotiated_session_announces_stream_again() {
        let mut negotiator = viewer();
        negotiator
            .handle_offer(&id("host"), SessionDescription::offer("o1"))
            .expect("offer");
        assert!(negotiator
            .track_received(&id("host"), StreamHandle::new("s1"))
            .is_some());
        negotiator
            .handle_offer(&id("host"), SessionDescription::offer("o2"))
            .expect("offer");
        assert!(negotiator
            .track_received(&id("host"), StreamHandle::new("s1"))
            .is_some());
    }

    #[test]
    fn test_ready_or_grace_offers_once() {
        let mut negotiator = broadcaster();
        assert!(negotiator.peer_joined(&id("n")));
        assert!(negotiator.is_awaiting_ready(&id("n")));
        assert!(negotiator.drain_outbound().is_empty());

        negotiator.peer_ready(&id("n")).expect("offer");
        negotiator.join_grace_elapsed(&id("n")).expect("no-op");

        let out = negotiator.drain_outbound();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to(), Some(&id("n")));
    }

    #[test]
    fn test_grace_fallback_offers() {
        let mut negotiator = broadcaster();
        negotiator.peer_joined(&id("n"));
        negotiator.join_grace_elapsed(&id("n")).expect("offer");
        assert_eq!(negotiator.drain_outbound().len(), 1);
    }

    #[test]
    fn test_stop_broadcast_closes_everything() {
        let mut negotiator = broadcaster();
        negotiator.create_offer(&id("a")).expect("offer");
        negotiator.create_offer(&id("b")).expect("offer");
        negotiator.peer_joined(&id("c"));

        let stream = negotiator.stop_broadcast();
        assert_eq!(stream, Some(StreamHandle::new("screen")));
        assert_eq!(negotiator.session_count(), 0);
        assert!(!negotiator.is_awaiting_ready(&id("c")));
        let closes = negotiator
            .engine()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Close(_)))
            .count();
        assert_eq!(closes, 2);
    }

    #[test]
    fn test_retain_peers_releases_departed() {
        let mut negotiator = broadcaster();
        negotiator.create_offer(&id("a")).expect("offer");
        negotiator.create_offer(&id("b")).expect("offer");

        let mut session = Session::new();
        session.join(id("me"), "Me".into());
        session.join(id("a"), "A".into());
        session.start_share(&id("me"));
        negotiator.retain_peers(&session);

        assert!(negotiator.state(&id("a")).is_some());
        assert!(negotiator.state(&id("b")).is_none());
        assert!(negotiator.engine().calls().contains(&Call::Close(id("b"))));
    }

    #[test]
    fn test_viewer_releases_session_when_broadcast_stops() {
        let mut negotiator = viewer();
        negotiator
            .handle_offer(&id("host"), SessionDescription::offer("o"))
            .expect("offer");

        let mut session = Session::new();
        session.join(id("me"), "Me".into());
        session.join(id("host"), "Host".into());
        negotiator.retain_peers(&session);

        assert_eq!(negotiator.session_count(), 0);
    }
}
