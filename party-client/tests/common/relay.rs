//! Relay running on its own thread and runtime.
//!
//! Stopping drops the whole runtime, which also drops every spawned
//! WebSocket task, so clients see their connections die the way they would
//! if the relay process went away.

use std::net::SocketAddr;
use std::thread::JoinHandle;

use party_server::{router, AppState, ServerConfig};
use tokio::sync::oneshot;

pub struct RelayProcess {
    addr: SocketAddr,
    stop_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl RelayProcess {
    /// Start a relay on a random free port.
    pub fn start() -> Self {
        let port = portpicker::pick_unused_port().expect("No free port");
        Self::start_on(port)
    }

    /// Start a relay on `port`.
    pub fn start_on(port: u16) -> Self {
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("relay runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind(addr)
                    .await
                    .expect("Failed to bind relay");
                let app = router(AppState::new(&ServerConfig::default()));
                let _ = ready_tx.send(());
                tokio::select! {
                    _ = axum::serve(listener, app) => {}
                    _ = stop_rx => {}
                }
            });
            drop(runtime);
        });

        ready_rx.recv().expect("relay did not start");
        Self {
            addr,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Stop the relay and every connection it holds.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for RelayProcess {
    fn drop(&mut self) {
        self.halt();
    }
}
