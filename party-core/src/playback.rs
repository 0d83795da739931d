//! Playback synchronization.
//!
//! Local player changes go out as `play`/`pause`/`seek`/`load`; remote ones
//! are applied to the local player. While a remote change is being applied a
//! reentrancy guard suppresses outbound messages, because the player reports
//! the change back as if the user had made it. The guard expires a fixed
//! window after activation instead of synchronously, since those reports
//! arrive asynchronously.
//!
//! Drift is reconciled by a heartbeat: the playing side periodically sends
//! `sync`, and receivers jump only if they are off by more than the
//! tolerance.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{PartyConfig, SignalMessage};

/// The local video player.
///
/// Implementations report every state change, including ones caused by
/// calls on this trait, as [`PlayerEvent`]s.
pub trait Player {
    /// Current position in seconds.
    fn current_time(&self) -> f64;
    /// Whether playback is paused.
    fn is_paused(&self) -> bool;
    /// Currently loaded source URL.
    fn source(&self) -> Option<String>;
    /// Replace the source.
    fn load(&mut self, url: &str);
    /// Start playback.
    fn play(&mut self);
    /// Pause playback.
    fn pause(&mut self);
    /// Jump to `time` seconds.
    fn seek(&mut self, time: f64);
}

/// Notifications from the local player.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Playback started.
    Played,
    /// Playback paused.
    Paused,
    /// Position jumped to the given time.
    Seeked(f64),
    /// A new source was loaded.
    SourceChanged(String),
}

/// Logical playback position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// Position in seconds.
    pub media_time: f64,
    /// Whether playing.
    pub playing: bool,
}

impl SyncState {
    /// Read the state off a player.
    #[must_use]
    pub fn observe<P: Player + ?Sized>(player: &P) -> Self {
        Self {
            media_time: player.current_time(),
            playing: !player.is_paused(),
        }
    }
}

/// Playback synchronizer for one client.
#[derive(Debug, Clone)]
pub struct PlaybackSync {
    drift_tolerance: f64,
    guard_window: Duration,
    guard_until: Option<Instant>,
    source: Option<String>,
    state: SyncState,
}

impl PlaybackSync {
    /// Create a synchronizer with the configured tolerance and guard window.
    #[must_use]
    pub fn new(config: &PartyConfig) -> Self {
        Self {
            drift_tolerance: config.drift_tolerance,
            guard_window: config.guard_window,
            guard_until: None,
            source: None,
            state: SyncState::default(),
        }
    }

    /// Last observed playback state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Source URL last loaded locally or remotely.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Whether a remote change is still being applied at `now`.
    #[must_use]
    pub fn is_applying_remote(&self, now: Instant) -> bool {
        self.guard_until.is_some_and(|until| now < until)
    }

    /// When the current guard expires, if one is active.
    #[must_use]
    pub fn guard_expiry(&self) -> Option<Instant> {
        self.guard_until
    }

    /// Apply a remote playback message to `player`.
    ///
    /// Returns false for messages that are not playback messages.
    pub fn apply_remote<P: Player + ?Sized>(
        &mut self,
        message: &SignalMessage,
        player: &mut P,
        now: Instant,
    ) -> bool {
        match message {
            SignalMessage::Load { url, .. } => {
                self.arm_guard(now);
                tracing::info!(url = %url, "Remote load");
                self.source = Some(url.clone());
                player.load(url);
            }
            SignalMessage::Play { .. } => {
                self.arm_guard(now);
                tracing::debug!("Remote play");
                player.play();
            }
            SignalMessage::Pause { .. } => {
                self.arm_guard(now);
                tracing::debug!("Remote pause");
                player.pause();
            }
            SignalMessage::Seek { time, .. } => {
                self.arm_guard(now);
                tracing::debug!(time = *time, "Remote seek");
                player.seek(*time);
            }
            SignalMessage::Sync { time, playing, .. } => {
                self.arm_guard(now);
                let drift = (player.current_time() - time).abs();
                if drift > self.drift_tolerance {
                    tracing::debug!(drift, time = *time, "Drift beyond tolerance, seeking");
                    player.seek(*time);
                }
                if *playing && player.is_paused() {
                    player.play();
                } else if !*playing && !player.is_paused() {
                    player.pause();
                }
            }
            _ => return false,
        }
        true
    }

    /// React to a player notification.
    ///
    /// Returns the message to broadcast, or `None` when the change came from
    /// a remote event or repeats the already-loaded source.
    pub fn on_player_event<P: Player + ?Sized>(
        &mut self,
        event: &PlayerEvent,
        player: &P,
        now: Instant,
    ) -> Option<SignalMessage> {
        if let PlayerEvent::SourceChanged(url) = event {
            if self.source.as_deref() == Some(url.as_str()) {
                return None;
            }
            self.source = Some(url.clone());
        }

        if self.is_applying_remote(now) {
            tracing::debug!(event = ?event, "Suppressing echo of remote change");
            return None;
        }

        let message = match event {
            PlayerEvent::Played => SignalMessage::Play { from: None },
            PlayerEvent::Paused => SignalMessage::Pause { from: None },
            PlayerEvent::Seeked(_) => SignalMessage::Seek {
                time: player.current_time(),
                from: None,
            },
            PlayerEvent::SourceChanged(url) => SignalMessage::Load {
                url: url.clone(),
                from: None,
            },
        };
        Some(message)
    }

    /// Heartbeat tick: report our position while playing.
    #[must_use]
    pub fn heartbeat<P: Player + ?Sized>(&self, player: &P, now: Instant) -> Option<SignalMessage> {
        if player.is_paused() || self.is_applying_remote(now) {
            return None;
        }
        Some(SignalMessage::Sync {
            time: player.current_time(),
            playing: true,
            from: None,
        })
    }

    /// Re-read the player. Returns the new state if it changed.
    pub fn refresh<P: Player + ?Sized>(&mut self, player: &P) -> Option<SyncState> {
        let observed = SyncState::observe(player);
        if observed == self.state {
            return None;
        }
        self.state = observed;
        Some(observed)
    }

    fn arm_guard(&mut self, now: Instant) {
        self.guard_until = Some(now + self.guard_window);
    }
}
