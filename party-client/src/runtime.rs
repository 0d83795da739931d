//! # Client Runtime
//!
//! Drives a [`ClientCore`] from one task. Relay messages, link status
//! changes, UI commands, player and media notifications and fired timers
//! are all taken from a single `select!` loop, so the core only ever sees
//! one event at a time. After each event the core's effects are carried
//! out: sends go to the [`TransportLink`], UI events to the event channel,
//! timers onto a [`JoinSet`].

use std::time::{Duration, Instant};

use party_core::{
    ClientCore, Command, CoreEvent, Effect, LinkStatus, MediaCapture, MediaEngine, MediaEvent,
    NameStore, PartyConfig, PartyError, Player, PlayerEvent, SignalMessage, Timer,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::TransportLink;

/// Senders feeding a client runtime.
///
/// Cloneable so the UI, the player and the media engine can each hold one.
#[derive(Debug, Clone)]
pub struct ClientInputs {
    commands: mpsc::UnboundedSender<Command>,
    player_events: mpsc::UnboundedSender<PlayerEvent>,
    media_events: mpsc::UnboundedSender<MediaEvent>,
}

#[allow(clippy::must_use_candidate)]
impl ClientInputs {
    /// Create a connected pair of input senders and receivers.
    ///
    /// The senders can be handed to collaborators before the runtime exists.
    #[must_use]
    pub fn channel() -> (Self, InputReceivers) {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (player_events, player_events_rx) = mpsc::unbounded_channel();
        let (media_events, media_events_rx) = mpsc::unbounded_channel();
        (
            Self {
                commands,
                player_events,
                media_events,
            },
            InputReceivers {
                commands: commands_rx,
                player_events: player_events_rx,
                media_events: media_events_rx,
            },
        )
    }

    /// Queue a UI command. Returns false if the runtime has stopped.
    pub fn command(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Queue a player notification. Returns false if the runtime has stopped.
    pub fn player_event(&self, event: PlayerEvent) -> bool {
        self.player_events.send(event).is_ok()
    }

    /// Queue a media engine notification. Returns false if the runtime has stopped.
    pub fn media_event(&self, event: MediaEvent) -> bool {
        self.media_events.send(event).is_ok()
    }
}

/// Receiving half of [`ClientInputs`], consumed by [`ClientRuntime::new`].
#[derive(Debug)]
pub struct InputReceivers {
    commands: mpsc::UnboundedReceiver<Command>,
    player_events: mpsc::UnboundedReceiver<PlayerEvent>,
    media_events: mpsc::UnboundedReceiver<MediaEvent>,
}

/// Event loop around one [`ClientCore`].
pub struct ClientRuntime<E: MediaEngine, C, P, N> {
    core: ClientCore<E, C, P, N>,
    link: TransportLink,
    inbound: mpsc::UnboundedReceiver<SignalMessage>,
    status: watch::Receiver<LinkStatus>,
    inputs: InputReceivers,
    timers: JoinSet<Timer>,
    events: mpsc::UnboundedSender<CoreEvent>,
}

impl<E, C, P, N> ClientRuntime<E, C, P, N>
where
    E: MediaEngine,
    C: MediaCapture,
    P: Player,
    N: NameStore,
{
    /// Wire a core to a link and its inputs.
    ///
    /// Returns the runtime and the receiver for UI events.
    #[must_use]
    pub fn new(
        core: ClientCore<E, C, P, N>,
        link: TransportLink,
        inbound: mpsc::UnboundedReceiver<SignalMessage>,
        inputs: InputReceivers,
    ) -> (Self, mpsc::UnboundedReceiver<CoreEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let status = link.subscribe();
        let runtime = Self {
            core,
            link,
            inbound,
            status,
            inputs,
            timers: JoinSet::new(),
            events,
        };
        (runtime, events_rx)
    }

    /// Connect to `url` and assemble a runtime in one step.
    #[must_use]
    pub fn connect(
        url: impl Into<String>,
        config: PartyConfig,
        engine: E,
        capture: C,
        player: P,
        names: N,
        inputs: InputReceivers,
    ) -> (Self, mpsc::UnboundedReceiver<CoreEvent>) {
        let (link, inbound) = TransportLink::connect(url, config.reconnect_delay);
        let core = ClientCore::new(config, engine, capture, player, names);
        Self::new(core, link, inbound, inputs)
    }

    /// The core being driven.
    #[must_use]
    pub fn core(&self) -> &ClientCore<E, C, P, N> {
        &self.core
    }

    /// Run until `shutdown` fires or the link task ends.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let initial = *self.status.borrow_and_update();
        self.core.handle_link_status(initial);
        self.apply_effects();

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                changed = self.status.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Transport link task ended");
                        break;
                    }
                    let status = *self.status.borrow_and_update();
                    self.core.handle_link_status(status);
                }

                Some(message) = self.inbound.recv() => {
                    self.core.handle_message(message, Instant::now());
                }

                Some(command) = self.inputs.commands.recv() => {
                    tracing::debug!(command = ?command, "UI command");
                    self.core.handle_command(command);
                }

                Some(event) = self.inputs.player_events.recv() => {
                    self.core.handle_player_event(&event, Instant::now());
                }

                Some(event) = self.inputs.media_events.recv() => {
                    self.core.handle_media_event(event);
                }

                Some(fired) = self.timers.join_next(), if !self.timers.is_empty() => {
                    match fired {
                        Ok(timer) => self.core.handle_timer(timer, Instant::now()),
                        Err(e) => tracing::warn!("Timer task failed: {}", e),
                    }
                }
            }
            self.apply_effects();
        }

        self.timers.abort_all();
        self.link.shutdown().await;
    }

    fn apply_effects(&mut self) {
        for effect in self.core.drain_effects() {
            match effect {
                Effect::Send(message) => match self.link.send(&message) {
                    Ok(()) => {}
                    Err(PartyError::TransportUnavailable) => {
                        tracing::debug!(kind = message.kind(), "Link down, dropping message");
                    }
                    Err(e) => tracing::warn!(kind = message.kind(), "Failed to send: {}", e),
                },
                Effect::Emit(event) => {
                    if self.events.send(event).is_err() {
                        tracing::trace!("No UI listening for events");
                    }
                }
                Effect::Schedule(timer, delay) => self.schedule(timer, delay),
            }
        }
    }

    fn schedule(&mut self, timer: Timer, delay: Duration) {
        self.timers.spawn(async move {
            tokio::time::sleep(delay).await;
            timer
        });
    }
}

impl<E, C, P, N> ClientRuntime<E, C, P, N>
where
    E: MediaEngine + Send + 'static,
    E::Connection: Send + 'static,
    C: MediaCapture + Send + 'static,
    P: Player + Send + 'static,
    N: NameStore + Send + 'static,
{
    /// Run on a new task.
    #[must_use]
    pub fn spawn(self) -> RuntimeHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let status = self.status.clone();
        let task = tokio::spawn(self.run(shutdown_rx));
        RuntimeHandle {
            task,
            status,
            shutdown_tx: Some(shutdown_tx),
        }
    }
}

/// Handle to a spawned [`ClientRuntime`].
pub struct RuntimeHandle {
    task: JoinHandle<()>,
    status: watch::Receiver<LinkStatus>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl RuntimeHandle {
    /// Current transport link status.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    /// Stop the runtime and close its link.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                tracing::warn!("Client runtime task failed: {}", e);
            }
        }
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
