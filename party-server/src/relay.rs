//! # WebSocket Relay
//!
//! The relay owns the authoritative [`Session`] and fans messages out to
//! connected clients. Every registry event (connect, disconnect, rename,
//! share claim, share release) runs as one critical section that mutates the
//! session and queues the resulting snapshot for every client before the
//! lock is released, so two racing events can never interleave their
//! updates or their broadcasts.
//!
//! ## Relay behavior
//!
//! - connect: `init` to the new client, `new-client` to everyone else,
//!   then `user-list` to all
//! - `set-name`, `start-share` (first writer wins), `stop-share`
//!   (broadcaster only), disconnect: `user-list` to all
//! - `offer` / `answer` / `ice-candidate`: forwarded to `to` with `from`
//!   stamped; unknown recipients are dropped
//! - `ready` / `load` / `play` / `pause` / `seek` / `sync`: forwarded to
//!   everyone except the sender with `from` stamped
//!
//! The per-connection [`RateLimiter`] meters only the broadcast kinds above
//! (and unparseable frames). Registry events and directed signaling are
//! never throttled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use party_core::{ClientId, Session, SignalMessage, UserEntry};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::metrics::{
    dec_ws_connections, inc_ws_connections, record_rate_limited, record_signaling_message,
    record_validation_failure, record_ws_message, set_session_gauges,
};
use crate::validation::{validate_message_size, validate_signal};

/// Token bucket rate limiter for WebSocket connections.
///
/// Allows burst traffic up to `capacity` tokens, refilling at `refill_rate` tokens per second.
pub struct RateLimiter {
    /// Current number of available tokens.
    tokens: f64,
    /// Maximum token capacity (burst limit).
    capacity: f64,
    /// Tokens added per second (sustained rate).
    refill_rate: f64,
    /// Last time tokens were refilled.
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    ///
    /// * `burst_capacity` - Maximum number of tokens (burst limit)
    /// * `sustained_rate` - Tokens added per second (sustained rate)
    #[must_use]
    pub fn new(burst_capacity: u32, sustained_rate: u32) -> Self {
        Self {
            tokens: f64::from(burst_capacity),
            capacity: f64::from(burst_capacity),
            refill_rate: f64::from(sustained_rate),
            last_refill: Instant::now(),
        }
    }

    /// Try to consume one token. Returns true if allowed, false if rate limited.
    pub fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let new_tokens = elapsed.as_secs_f64() * self.refill_rate;
        self.tokens = (self.tokens + new_tokens).min(self.capacity);
        self.last_refill = now;
    }

    /// Get the time until the next token is available.
    ///
    /// Returns `None` if tokens are already available.
    #[must_use]
    pub fn time_until_available(&self) -> Option<Duration> {
        if self.tokens >= 1.0 {
            None
        } else if self.refill_rate <= 0.0 {
            Some(Duration::MAX)
        } else {
            let needed = 1.0 - self.tokens;
            Some(Duration::from_secs_f64(needed / self.refill_rate))
        }
    }
}

/// Relay failures surfaced to a client as `error` replies.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The registry lock was poisoned by a panicking holder.
    #[error("session registry unavailable")]
    LockPoisoned,
    /// The client sent a kind only the relay may originate.
    #[error("clients may not send {0} messages")]
    UnexpectedMessage(&'static str),
}

impl RelayError {
    /// Wire `code` for the error reply.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::LockPoisoned => "internal_error",
            Self::UnexpectedMessage(_) => "unexpected_message",
        }
    }
}

/// Point-in-time view of the session, as served by `GET /api/session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Connected clients, sorted by id.
    pub users: Vec<UserEntry>,
    /// Current broadcaster.
    pub broadcaster: Option<ClientId>,
}

struct Registry {
    session: Session,
    peers: HashMap<ClientId, mpsc::UnboundedSender<SignalMessage>>,
}

impl Registry {
    fn send_to(&self, id: &ClientId, message: SignalMessage) -> bool {
        match self.peers.get(id) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    fn broadcast(&self, message: &SignalMessage, except: Option<&ClientId>) {
        for (id, tx) in &self.peers {
            if Some(id) == except {
                continue;
            }
            if tx.send(message.clone()).is_err() {
                tracing::debug!(client_id = %id, "Dropping message for closing connection");
            }
        }
    }

    fn broadcast_user_list(&self) {
        let message = SignalMessage::UserList {
            users: self.session.user_entries(),
            broadcaster: self.session.broadcaster().cloned(),
        };
        self.broadcast(&message, None);
        set_session_gauges(self.session.len(), self.session.broadcaster().is_some());
    }
}

/// Shared relay state: the session registry plus connection settings.
#[derive(Clone)]
pub struct RelayState {
    registry: Arc<Mutex<Registry>>,
    rate_limit_burst: u32,
    rate_limit_sustained: u32,
}

impl RelayState {
    /// Create an empty relay using the rate limits from `config`.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                session: Session::new(),
                peers: HashMap::new(),
            })),
            rate_limit_burst: config.rate_limit_burst,
            rate_limit_sustained: config.rate_limit_sustained,
        }
    }

    /// A fresh per-connection rate limiter.
    #[must_use]
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.rate_limit_burst, self.rate_limit_sustained)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Registry>, RelayError> {
        self.registry.lock().map_err(|e| {
            tracing::error!("Relay registry lock poisoned ({})", e);
            RelayError::LockPoisoned
        })
    }

    /// Register a new client.
    ///
    /// Returns its id and the receiver for everything addressed to it. The
    /// `init` and first `user-list` are already queued on the receiver.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::LockPoisoned`] if the registry is unusable.
    pub fn connect(
        &self,
    ) -> Result<(ClientId, mpsc::UnboundedReceiver<SignalMessage>), RelayError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = self.lock()?;

        let mut id = ClientId::generate();
        while registry.session.contains(&id) {
            id = ClientId::generate();
        }
        let username = id.default_name();
        registry.session.join(id.clone(), username.clone());
        registry.peers.insert(id.clone(), tx);

        registry.send_to(
            &id,
            SignalMessage::Init {
                id: id.clone(),
                username: username.clone(),
                broadcaster: registry.session.broadcaster().cloned(),
            },
        );
        registry.broadcast(&SignalMessage::NewClient { id: id.clone() }, Some(&id));
        registry.broadcast_user_list();

        tracing::info!(client_id = %id, name = %username, "Client connected");
        Ok((id, rx))
    }

    /// Remove a client, releasing the broadcaster slot if it held it.
    pub fn disconnect(&self, id: &ClientId) {
        match self.registry.lock() {
            Ok(mut registry) => {
                registry.peers.remove(id);
                let was_broadcaster = registry.session.broadcaster() == Some(id);
                if registry.session.leave(id) {
                    if was_broadcaster {
                        tracing::info!(client_id = %id, "Broadcaster disconnected");
                    }
                    registry.broadcast_user_list();
                    tracing::info!(client_id = %id, "Client disconnected");
                }
            }
            Err(e) => {
                tracing::error!(
                    client_id = %id,
                    "Failed to unregister client: lock poisoned ({})",
                    e
                );
            }
        }
    }

    /// Apply one validated message from `from`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnexpectedMessage`] for relay-only kinds, or
    /// [`RelayError::LockPoisoned`].
    pub fn handle(&self, from: &ClientId, message: SignalMessage) -> Result<(), RelayError> {
        if message.is_relay_only() {
            return Err(RelayError::UnexpectedMessage(message.kind()));
        }
        let mut registry = self.lock()?;

        match message {
            SignalMessage::SetName { name } => {
                let name = name.trim().to_string();
                if registry.session.rename(from, name.clone()) {
                    tracing::info!(client_id = %from, name = %name, "Client renamed");
                    registry.broadcast_user_list();
                }
            }
            SignalMessage::StartShare => {
                if registry.session.start_share(from) {
                    tracing::info!(client_id = %from, "Broadcast started");
                    registry.broadcast_user_list();
                } else {
                    tracing::debug!(
                        client_id = %from,
                        broadcaster = ?registry.session.broadcaster(),
                        "Ignoring start-share, slot taken"
                    );
                }
            }
            SignalMessage::StopShare => {
                if registry.session.stop_share(from) {
                    tracing::info!(client_id = %from, "Broadcast stopped");
                    registry.broadcast_user_list();
                }
            }
            directed if directed.is_directed() => {
                let kind = directed.kind();
                let Some(to) = directed.to().cloned() else {
                    return Ok(());
                };
                if registry.send_to(&to, directed.stamped(from)) {
                    record_signaling_message(kind);
                    tracing::debug!(from = %from, to = %to, kind, "Relayed signaling message");
                } else {
                    tracing::debug!(from = %from, to = %to, kind, "Dropping message for unknown recipient");
                }
            }
            broadcast => {
                let stamped = broadcast.stamped(from);
                registry.broadcast(&stamped, Some(from));
            }
        }
        Ok(())
    }

    /// Current session snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::LockPoisoned`] if the registry is unusable.
    pub fn snapshot(&self) -> Result<SessionSnapshot, RelayError> {
        let registry = self.lock()?;
        Ok(SessionSnapshot {
            users: registry.session.user_entries(),
            broadcaster: registry.session.broadcaster().cloned(),
        })
    }

    /// Number of connected clients.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::LockPoisoned`] if the registry is unusable.
    pub fn client_count(&self) -> Result<usize, RelayError> {
        Ok(self.lock()?.session.len())
    }
}

fn error_reply(code: &str, message: impl Into<String>) -> SignalMessage {
    SignalMessage::Error {
        code: code.to_string(),
        message: message.into(),
    }
}

fn rate_limit_reply(client_id: &ClientId, limiter: &mut RateLimiter) -> Option<SignalMessage> {
    if limiter.try_consume() {
        return None;
    }
    tracing::warn!(client_id = %client_id, "Rate limit exceeded");
    record_rate_limited("websocket");
    let retry_after = limiter
        .time_until_available()
        .map_or(100, |d| d.as_millis().min(10000));
    Some(error_reply(
        "rate_limited",
        format!("Rate limit exceeded. Retry after {retry_after}ms"),
    ))
}

/// Run one inbound text frame through validation, rate limiting and the
/// registry. Returns the error reply for the sender, if any.
///
/// Only broadcast kinds and unparseable frames spend rate limit tokens.
/// Registry events and directed signaling are never throttled.
pub fn process_frame(
    state: &RelayState,
    client_id: &ClientId,
    limiter: &mut RateLimiter,
    text: &str,
) -> Option<SignalMessage> {
    if let Err(e) = validate_message_size(text.len()) {
        tracing::warn!(client_id = %client_id, "Message rejected: {}", e);
        record_validation_failure(e.field());
        return Some(error_reply("message_too_large", e.to_string()));
    }

    let message = match SignalMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            if let Some(reply) = rate_limit_reply(client_id, limiter) {
                return Some(reply);
            }
            tracing::debug!(client_id = %client_id, "Unparseable frame: {}", e);
            return Some(error_reply("parse_error", e.to_string()));
        }
    };

    if message.is_broadcast() {
        if let Some(reply) = rate_limit_reply(client_id, limiter) {
            return Some(reply);
        }
    }
    record_ws_message("inbound", message.kind());

    if let Err(e) = validate_signal(&message) {
        tracing::warn!(client_id = %client_id, kind = message.kind(), "Message rejected: {}", e);
        record_validation_failure(e.field());
        return Some(error_reply("validation_error", e.to_string()));
    }

    match state.handle(client_id, message) {
        Ok(()) => None,
        Err(e) => Some(error_reply(e.code(), e.to_string())),
    }
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &SignalMessage,
) -> Result<(), axum::Error> {
    match message.to_json() {
        Ok(json) => {
            record_ws_message("outbound", message.kind());
            sender.send(Message::Text(json.into())).await
        }
        Err(e) => {
            tracing::error!(kind = message.kind(), "Failed to serialize message: {}", e);
            Ok(())
        }
    }
}

/// Handle one client WebSocket for its whole lifetime.
pub async fn handle_relay_socket(socket: WebSocket, state: RelayState) {
    let (mut sender, mut receiver) = socket.split();

    let (client_id, mut peer_rx) = match state.connect() {
        Ok(registered) => registered,
        Err(e) => {
            tracing::error!("Failed to register client: {}", e);
            let _ = send_message(&mut sender, &error_reply(e.code(), e.to_string())).await;
            return;
        }
    };
    inc_ws_connections();

    let mut rate_limiter = state.rate_limiter();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = process_frame(&state, &client_id, &mut rate_limiter, text.as_str()) {
                            if send_message(&mut sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!(client_id = %client_id, "Client closed connection");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(client_id = %client_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }

            outbound = peer_rx.recv() => {
                match outbound {
                    Some(message) => {
                        if send_message(&mut sender, &message).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        tracing::debug!(client_id = %client_id, "Client channel closed");
                        break;
                    }
                }
            }
        }
    }

    state.disconnect(&client_id);
    dec_ws_connections();
}
