//! Shared harness for client runtime integration tests.

#![allow(dead_code)]

mod fakes;
mod relay;

pub use fakes::{EngineCall, FakeCapture, FakeEngine, PlayerState, SharedPlayer};
pub use relay::RelayProcess;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use party_client::{ClientInputs, ClientRuntime, RuntimeHandle};
use party_core::{
    ClientId, CoreEvent, IceConfig, MemoryNameStore, NameStore, PartyConfig, DISPLAY_NAME_KEY,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// How long to wait for an expected event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// ICE server every test client is configured with.
pub const TEST_STUN_SERVER: &str = "stun:stun.test.invalid:3478";

/// Protocol timings shortened for tests.
pub fn test_config() -> PartyConfig {
    PartyConfig {
        reconnect_delay: Duration::from_millis(100),
        join_grace: Duration::from_millis(300),
        ice_servers: vec![TEST_STUN_SERVER.to_string()],
        ..PartyConfig::default()
    }
}

/// A spawned client runtime with fake collaborators.
pub struct TestClient {
    pub inputs: ClientInputs,
    pub events: mpsc::UnboundedReceiver<CoreEvent>,
    pub player: Arc<Mutex<PlayerState>>,
    pub calls: Arc<Mutex<Vec<EngineCall>>>,
    pub ice: Arc<Mutex<Vec<IceConfig>>>,
    pub released: Arc<Mutex<Vec<String>>>,
    handle: RuntimeHandle,
}

impl TestClient {
    /// Start a client against `url` with default fakes.
    pub fn start(url: &str) -> Self {
        Self::start_with(url, MemoryNameStore::new(), false)
    }

    /// Start a client whose name store already holds `name`.
    pub fn start_named(url: &str, name: &str) -> Self {
        let mut names = MemoryNameStore::new();
        names.set(DISPLAY_NAME_KEY, name);
        Self::start_with(url, names, false)
    }

    /// Start a client whose capture source refuses permission.
    pub fn start_denied(url: &str) -> Self {
        Self::start_with(url, MemoryNameStore::new(), true)
    }

    fn start_with(url: &str, names: MemoryNameStore, deny_capture: bool) -> Self {
        let (inputs, receivers) = ClientInputs::channel();
        let engine = FakeEngine::default();
        let calls = Arc::clone(&engine.log);
        let ice = Arc::clone(&engine.ice);
        let capture = FakeCapture {
            deny: deny_capture,
            ..FakeCapture::default()
        };
        let released = Arc::clone(&capture.released);
        let player = SharedPlayer::new(inputs.clone());
        let player_state = Arc::clone(&player.state);

        let (runtime, events) = ClientRuntime::connect(
            url,
            test_config(),
            engine,
            capture,
            player,
            names,
            receivers,
        );

        Self {
            inputs,
            events,
            player: player_state,
            calls,
            ice,
            released,
            handle: runtime.spawn(),
        }
    }

    /// Wait for the first event matching `pred`, skipping others.
    pub async fn wait_for<F>(&mut self, mut pred: F) -> Option<CoreEvent>
    where
        F: FnMut(&CoreEvent) -> bool,
    {
        timeout(EVENT_TIMEOUT, async {
            while let Some(event) = self.events.recv().await {
                if pred(&event) {
                    return Some(event);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    /// Wait for the relay to assign an identity and return it.
    pub async fn identity(&mut self) -> ClientId {
        match self
            .wait_for(|e| matches!(e, CoreEvent::IdentityAssigned { .. }))
            .await
        {
            Some(CoreEvent::IdentityAssigned { id, .. }) => id,
            other => panic!("Expected IdentityAssigned, got {other:?}"),
        }
    }

    /// Wait for a user list with exactly `count` clients.
    pub async fn wait_for_users(&mut self, count: usize) {
        let seen = self
            .wait_for(|e| matches!(e, CoreEvent::UserListChanged(users) if users.len() == count))
            .await;
        assert!(seen.is_some(), "Expected a user list of {count}");
    }

    /// Engine calls recorded so far.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().expect("call log").clone()
    }

    /// ICE settings of every session the engine opened.
    pub fn ice_configs(&self) -> Vec<IceConfig> {
        self.ice.lock().expect("ice log").clone()
    }

    /// Snapshot of the fake player.
    pub fn player(&self) -> PlayerState {
        self.player.lock().expect("player state").clone()
    }

    /// Stop the runtime.
    pub async fn shutdown(self) {
        self.handle.shutdown().await;
    }
}

/// Poll `check` until it holds or the event timeout expires.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    timeout(EVENT_TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}
