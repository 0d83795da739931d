//! # Transport Link
//!
//! A reconnecting WebSocket channel to the relay.
//!
//! The link runs in its own task. Every connection attempt publishes
//! `connecting`, a successful handshake publishes `open`, and any close not
//! requested locally publishes `closed` and schedules another attempt after
//! a fixed delay, forever. Sends are only accepted while open; nothing is
//! queued across outages, and whatever was still buffered for a dead
//! connection is discarded with it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use party_core::{LinkStatus, PartyError, PartyResult, SignalMessage};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Outbound = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

/// Handle to a running transport link.
pub struct TransportLink {
    url: String,
    status: watch::Receiver<LinkStatus>,
    outbound: Outbound,
    task: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TransportLink {
    /// Start connecting to `url`, retrying `reconnect_delay` after every close.
    ///
    /// Returns the link and the receiver for inbound messages, already
    /// decoded, in arrival order.
    #[must_use]
    pub fn connect(
        url: impl Into<String>,
        reconnect_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<SignalMessage>) {
        let url = url.into();
        let (status_tx, status) = watch::channel(LinkStatus::Connecting);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let outbound: Outbound = Arc::new(Mutex::new(None));

        let task = tokio::spawn(run_link(
            url.clone(),
            reconnect_delay,
            status_tx,
            Arc::clone(&outbound),
            inbound_tx,
            shutdown_rx,
        ));

        let link = Self {
            url,
            status,
            outbound,
            task,
            shutdown_tx: Some(shutdown_tx),
        };
        (link, inbound_rx)
    }

    /// Relay URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    /// Watch connection status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    /// Send one message.
    ///
    /// # Errors
    ///
    /// Returns [`PartyError::TransportUnavailable`] when the link is not open,
    /// or [`PartyError::Serialization`] if the message cannot be encoded.
    pub fn send(&self, message: &SignalMessage) -> PartyResult<()> {
        if self.status() != LinkStatus::Open {
            return Err(PartyError::TransportUnavailable);
        }
        let json = message.to_json()?;
        let guard = self
            .outbound
            .lock()
            .map_err(|_| PartyError::TransportUnavailable)?;
        match guard.as_ref() {
            Some(tx) => tx.send(json).map_err(|_| PartyError::TransportUnavailable),
            None => Err(PartyError::TransportUnavailable),
        }
    }

    /// Close the connection and stop reconnecting.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                tracing::warn!(url = %self.url, "Transport link task failed: {}", e);
            }
        }
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Why a connection ended.
enum ConnectionEnd {
    /// Closed locally, or nobody reads inbound messages any more.
    Stopped,
    /// Closed by the relay or the network.
    Dropped,
}

fn set_outbound(outbound: &Outbound, tx: Option<mpsc::UnboundedSender<String>>) {
    match outbound.lock() {
        Ok(mut guard) => *guard = tx,
        Err(e) => tracing::error!("Outbound slot lock poisoned ({})", e),
    }
}

async fn run_link(
    url: String,
    reconnect_delay: Duration,
    status_tx: watch::Sender<LinkStatus>,
    outbound: Outbound,
    inbound: mpsc::UnboundedSender<SignalMessage>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        status_tx.send_replace(LinkStatus::Connecting);
        tracing::debug!(url = %url, "Connecting to relay");

        let connected = tokio::select! {
            _ = &mut shutdown_rx => break,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((ws, _response)) => {
                // Fresh channel per connection: anything queued for the
                // previous one is gone.
                let (tx, rx) = mpsc::unbounded_channel();
                set_outbound(&outbound, Some(tx));
                status_tx.send_replace(LinkStatus::Open);
                tracing::info!(url = %url, "Transport link open");

                let end = run_connection(ws, rx, &inbound, &mut shutdown_rx).await;

                set_outbound(&outbound, None);
                status_tx.send_replace(LinkStatus::Closed);
                if matches!(end, ConnectionEnd::Stopped) {
                    tracing::info!(url = %url, "Transport link closed");
                    return;
                }
                tracing::warn!(url = %url, "Transport link dropped");
            }
            Err(e) => {
                status_tx.send_replace(LinkStatus::Closed);
                tracing::warn!(url = %url, "Failed to connect to relay: {}", e);
            }
        }

        tracing::info!(url = %url, "Reconnecting in {:?}", reconnect_delay);
        tokio::select! {
            _ = &mut shutdown_rx => break,
            () = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    set_outbound(&outbound, None);
    status_tx.send_replace(LinkStatus::Closed);
}

async fn run_connection(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: &mpsc::UnboundedSender<SignalMessage>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> ConnectionEnd {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = &mut *shutdown_rx => {
                let _ = write.send(Message::Close(None)).await;
                return ConnectionEnd::Stopped;
            }

            Some(json) = outbound.recv() => {
                if let Err(e) = write.send(Message::Text(json)).await {
                    tracing::warn!("Failed to send to relay: {}", e);
                    return ConnectionEnd::Dropped;
                }
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match SignalMessage::from_json(&text) {
                        Ok(message) => {
                            if inbound.send(message).is_err() {
                                tracing::debug!("Inbound receiver dropped");
                                let _ = write.send(Message::Close(None)).await;
                                return ConnectionEnd::Stopped;
                            }
                        }
                        Err(e) => tracing::warn!("Dropping unparseable frame: {}", e),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(frame = ?frame, "Relay closed connection");
                        return ConnectionEnd::Dropped;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {}", e);
                        return ConnectionEnd::Dropped;
                    }
                    None => return ConnectionEnd::Dropped,
                }
            }
        }
    }
}
