//! Unified client dispatcher.
//!
//! [`ClientCore`] is the single owner of every inbound message kind. Relay
//! messages, UI commands, player and media notifications, and timers all
//! enter through one of its `handle_*` methods, one at a time, and leave as
//! [`Effect`]s for the runtime to carry out. It performs no I/O itself.

use std::time::{Duration, Instant};

use crate::{
    ClientId, ClientState, Command, CoreEvent, LinkStatus, MediaCapture, MediaEngine, MediaEvent,
    NameStore, Negotiator, PartyConfig, PartyResult, PlaybackSync, Player, PlayerEvent, Session,
    SignalMessage, StreamHandle, UserEntry, DISPLAY_NAME_KEY,
};

/// Timers the runtime runs on behalf of the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Timer {
    /// Periodic playback heartbeat.
    Heartbeat,
    /// Fallback offer to a peer that never reported ready.
    JoinGrace(ClientId),
}

/// Output of the core.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send over the transport link. Dropped if the link is down.
    Send(SignalMessage),
    /// Notify the UI.
    Emit(CoreEvent),
    /// Fire `Timer` after the delay.
    Schedule(Timer, Duration),
}

/// Client-side protocol state machine.
pub struct ClientCore<E: MediaEngine, C, P, N> {
    config: PartyConfig,
    state: ClientState,
    negotiator: Negotiator<E>,
    playback: PlaybackSync,
    capture: C,
    player: P,
    names: N,
    pending_share: Option<StreamHandle>,
    heartbeat_armed: bool,
    effects: Vec<Effect>,
}

impl<E, C, P, N> ClientCore<E, C, P, N>
where
    E: MediaEngine,
    C: MediaCapture,
    P: Player,
    N: NameStore,
{
    /// Assemble a core from its collaborators.
    #[must_use]
    pub fn new(config: PartyConfig, engine: E, capture: C, player: P, names: N) -> Self {
        Self {
            negotiator: Negotiator::new(engine, config.ice(), config.max_video_bitrate),
            playback: PlaybackSync::new(&config),
            config,
            state: ClientState::new(),
            capture,
            player,
            names,
            pending_share: None,
            heartbeat_armed: false,
            effects: Vec::new(),
        }
    }

    /// Cached client state.
    #[must_use]
    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// The negotiation orchestrator.
    #[must_use]
    pub fn negotiator(&self) -> &Negotiator<E> {
        &self.negotiator
    }

    /// The playback synchronizer.
    #[must_use]
    pub fn playback(&self) -> &PlaybackSync {
        &self.playback
    }

    /// The local player.
    #[must_use]
    pub fn player(&self) -> &P {
        &self.player
    }

    /// The local player, mutably.
    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    /// The capture source.
    #[must_use]
    pub fn capture(&self) -> &C {
        &self.capture
    }

    /// Whether the share control should be enabled.
    #[must_use]
    pub fn can_share(&self) -> bool {
        self.state.can_share()
    }

    /// Whether we are broadcasting or waiting for the relay to confirm it.
    #[must_use]
    pub fn is_sharing(&self) -> bool {
        self.negotiator.is_broadcasting() || self.pending_share.is_some()
    }

    /// Take every effect produced since the last call.
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// The transport link changed status.
    pub fn handle_link_status(&mut self, status: LinkStatus) {
        if !self.state.set_status(status) {
            return;
        }
        tracing::info!(status = ?status, "Link status changed");
        self.emit(CoreEvent::ConnectionStatus(status));

        match status {
            LinkStatus::Open if !self.heartbeat_armed => {
                self.heartbeat_armed = true;
                self.schedule(Timer::Heartbeat, self.config.heartbeat_interval);
            }
            LinkStatus::Closed => {
                if let Some(stream) = self.pending_share.take() {
                    self.capture.release(&stream);
                    self.emit(CoreEvent::ShareFailed("connection lost".into()));
                }
            }
            _ => {}
        }
    }

    /// Dispatch one message from the relay.
    pub fn handle_message(&mut self, message: SignalMessage, now: Instant) {
        if let Some(from) = message.from() {
            if self.state.is_own(from) {
                tracing::debug!(kind = message.kind(), "Ignoring own message");
                return;
            }
        }

        match message {
            SignalMessage::Init {
                id,
                username,
                broadcaster,
            } => self.on_init(id, username, broadcaster.as_ref()),
            SignalMessage::UserList { users, broadcaster } => {
                self.on_user_list(&users, broadcaster);
            }
            SignalMessage::NewClient { id } => {
                if self.negotiator.peer_joined(&id) {
                    self.schedule(Timer::JoinGrace(id), self.config.join_grace);
                }
            }
            SignalMessage::Ready { from: Some(peer) } => {
                log_failure(self.negotiator.peer_ready(&peer));
            }
            SignalMessage::Offer {
                offer,
                from: Some(peer),
                ..
            } => log_failure(self.negotiator.handle_offer(&peer, offer)),
            SignalMessage::Answer {
                answer,
                from: Some(peer),
                ..
            } => log_failure(self.negotiator.handle_answer(&peer, answer)),
            SignalMessage::IceCandidate {
                candidate,
                from: Some(peer),
                ..
            } => log_failure(self.negotiator.handle_candidate(&peer, candidate)),
            remote @ (SignalMessage::Load { .. }
            | SignalMessage::Play { .. }
            | SignalMessage::Pause { .. }
            | SignalMessage::Seek { .. }
            | SignalMessage::Sync { .. }) => {
                self.playback.apply_remote(&remote, &mut self.player, now);
                self.refresh_playback();
            }
            SignalMessage::Error { code, message } => {
                tracing::warn!(code = %code, "Relay rejected a message: {}", message);
            }
            other => {
                tracing::debug!(kind = other.kind(), "Ignoring unexpected message");
            }
        }
        self.flush_signaling();
    }

    /// Carry out a UI command.
    ///
    /// Playback commands only drive the player; the resulting
    /// [`PlayerEvent`] is what gets broadcast.
    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::Play => self.player.play(),
            Command::Pause => self.player.pause(),
            Command::Seek { time } => self.player.seek(time),
            Command::Load { url } => self.player.load(&url),
            Command::StartShare => self.start_share(),
            Command::StopShare => self.stop_share(),
            Command::SetName { name } => self.set_name(&name),
        }
        self.flush_signaling();
    }

    /// React to a local player notification.
    pub fn handle_player_event(&mut self, event: &PlayerEvent, now: Instant) {
        if let Some(message) = self.playback.on_player_event(event, &self.player, now) {
            self.send(message);
        }
        self.refresh_playback();
    }

    /// React to a media engine or capture notification.
    pub fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::LocalCandidate { peer, candidate } => {
                self.negotiator.local_candidate(&peer, candidate);
            }
            MediaEvent::ConnectivityChanged { peer, state } => {
                log_failure(self.negotiator.connectivity_changed(&peer, state));
            }
            MediaEvent::TrackReceived { peer, stream } => {
                if let Some(stream) = self.negotiator.track_received(&peer, stream) {
                    self.emit(CoreEvent::RemoteTrackReceived { peer, stream });
                }
            }
            MediaEvent::CaptureEnded => {
                tracing::info!("Capture ended");
                self.stop_share();
            }
        }
        self.flush_signaling();
    }

    /// A scheduled timer fired.
    pub fn handle_timer(&mut self, timer: Timer, now: Instant) {
        match timer {
            Timer::Heartbeat => {
                if let Some(message) = self.playback.heartbeat(&self.player, now) {
                    self.send(message);
                }
                self.schedule(Timer::Heartbeat, self.config.heartbeat_interval);
            }
            Timer::JoinGrace(peer) => {
                log_failure(self.negotiator.join_grace_elapsed(&peer));
            }
        }
        self.flush_signaling();
    }

    fn on_init(&mut self, id: ClientId, username: String, broadcaster: Option<&ClientId>) {
        // A fresh identity means the relay forgot anything we claimed before.
        self.abandon_share();

        let saved = self
            .names
            .get(DISPLAY_NAME_KEY)
            .filter(|name| !name.trim().is_empty());
        let name = saved.clone().unwrap_or(username);
        tracing::info!(
            client_id = %id,
            name = %name,
            broadcaster = ?broadcaster,
            "Identity assigned"
        );
        self.state.assign_identity(id.clone(), name.clone());
        self.emit(CoreEvent::IdentityAssigned { id, name });

        if let Some(saved) = saved {
            self.send(SignalMessage::SetName { name: saved });
        }
        self.send(SignalMessage::Ready { from: None });
    }

    fn on_user_list(&mut self, users: &[UserEntry], broadcaster: Option<ClientId>) {
        let session = Session::from_snapshot(users, broadcaster);
        let new_broadcaster = session.broadcaster().cloned();
        let changed = self.state.replace_session(session);

        self.emit(CoreEvent::UserListChanged(self.state.session().identities()));
        if changed {
            tracing::info!(broadcaster = ?new_broadcaster, "Broadcaster changed");
            self.emit(CoreEvent::BroadcasterChanged(new_broadcaster.clone()));
        }

        let we_broadcast = self.state.is_broadcaster();
        if let Some(stream) = self.pending_share.take() {
            if we_broadcast {
                let peers: Vec<ClientId> = self
                    .state
                    .session()
                    .client_ids()
                    .into_iter()
                    .filter(|peer| !self.state.is_own(peer))
                    .collect();
                self.negotiator.start_broadcast(stream, peers);
            } else if new_broadcaster.is_some() {
                tracing::info!("Another client claimed the broadcaster slot first");
                self.capture.release(&stream);
                self.emit(CoreEvent::ShareFailed(
                    "another client started sharing first".into(),
                ));
            } else {
                // Snapshot predates our claim.
                self.pending_share = Some(stream);
            }
        } else if self.negotiator.is_broadcasting() && !we_broadcast {
            tracing::warn!("Relay no longer lists us as broadcaster, stopping");
            if let Some(stream) = self.negotiator.stop_broadcast() {
                self.capture.release(&stream);
            }
        }

        self.negotiator.retain_peers(self.state.session());
    }

    fn start_share(&mut self) {
        if self.is_sharing() {
            return;
        }
        if !self.can_share() {
            self.emit(CoreEvent::ShareFailed(
                "another client is already sharing".into(),
            ));
            return;
        }
        match self.capture.acquire() {
            Ok(stream) => {
                tracing::info!(stream_id = %stream.id(), "Screen capture acquired");
                self.pending_share = Some(stream);
                self.send(SignalMessage::StartShare);
            }
            Err(e) => {
                tracing::warn!("{}", e);
                self.emit(CoreEvent::ShareFailed(e.to_string()));
            }
        }
    }

    fn stop_share(&mut self) {
        if let Some(stream) = self.pending_share.take() {
            self.capture.release(&stream);
            self.send(SignalMessage::StopShare);
        } else if let Some(stream) = self.negotiator.stop_broadcast() {
            self.capture.release(&stream);
            self.send(SignalMessage::StopShare);
        }
    }

    fn abandon_share(&mut self) {
        if let Some(stream) = self.pending_share.take() {
            self.capture.release(&stream);
            self.emit(CoreEvent::ShareFailed("connection lost".into()));
        }
        if let Some(stream) = self.negotiator.stop_broadcast() {
            tracing::info!("Dropping broadcast from previous connection");
            self.capture.release(&stream);
        }
    }

    fn set_name(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.names.set(DISPLAY_NAME_KEY, name);
        self.state.rename(name.to_string());
        self.send(SignalMessage::SetName {
            name: name.to_string(),
        });
    }

    fn refresh_playback(&mut self) {
        if let Some(state) = self.playback.refresh(&self.player) {
            self.emit(CoreEvent::PlaybackStateChanged(state));
        }
    }

    fn flush_signaling(&mut self) {
        for message in self.negotiator.drain_outbound() {
            self.effects.push(Effect::Send(message));
        }
    }

    fn send(&mut self, message: SignalMessage) {
        self.effects.push(Effect::Send(message));
    }

    fn emit(&mut self, event: CoreEvent) {
        self.effects.push(Effect::Emit(event));
    }

    fn schedule(&mut self, timer: Timer, delay: Duration) {
        self.effects.push(Effect::Schedule(timer, delay));
    }
}

fn log_failure(result: PartyResult<()>) {
    if let Err(e) = result {
        tracing::warn!("{}", e);
    }
}
