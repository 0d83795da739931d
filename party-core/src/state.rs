//! Client-side state cache.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{ClientId, Session};

/// Status of the transport link to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// Attempting to connect.
    Connecting,
    /// Connected; sends go through.
    Open,
    /// Disconnected; a reconnect is scheduled.
    Closed,
}

/// Persistent key-value storage for the chosen display name.
pub trait NameStore {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;
    /// Store `value` under `key`.
    fn set(&mut self, key: &str, value: &str);
}

/// [`NameStore`] that lives only as long as the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryNameStore {
    values: HashMap<String, String>,
}

impl MemoryNameStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameStore for MemoryNameStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

/// What this client knows about itself and the session.
#[derive(Debug, Clone)]
pub struct ClientState {
    status: LinkStatus,
    own_id: Option<ClientId>,
    display_name: Option<String>,
    session: Session,
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientState {
    /// State before the first connection attempt.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: LinkStatus::Connecting,
            own_id: None,
            display_name: None,
            session: Session::new(),
        }
    }

    /// Current link status.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Update the link status. Returns true if it changed.
    pub fn set_status(&mut self, status: LinkStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        true
    }

    /// Our relay-assigned id, once `init` arrived.
    #[must_use]
    pub fn own_id(&self) -> Option<&ClientId> {
        self.own_id.as_ref()
    }

    /// Our display name.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Whether `id` is us.
    #[must_use]
    pub fn is_own(&self, id: &ClientId) -> bool {
        self.own_id.as_ref() == Some(id)
    }

    /// Adopt the identity from `init`.
    pub fn assign_identity(&mut self, id: ClientId, display_name: String) {
        self.own_id = Some(id);
        self.display_name = Some(display_name);
    }

    /// Change our display name.
    pub fn rename(&mut self, display_name: String) {
        self.display_name = Some(display_name);
    }

    /// Cached session snapshot.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Replace the cached snapshot. Returns true if the broadcaster changed.
    pub fn replace_session(&mut self, session: Session) -> bool {
        let changed = self.session.broadcaster() != session.broadcaster();
        self.session = session;
        changed
    }

    /// Whether we are the broadcaster in the cached snapshot.
    #[must_use]
    pub fn is_broadcaster(&self) -> bool {
        self.own_id.is_some() && self.session.broadcaster() == self.own_id.as_ref()
    }

    /// Whether the share control should be enabled.
    ///
    /// False while someone else holds the broadcaster slot.
    #[must_use]
    pub fn can_share(&self) -> bool {
        match self.session.broadcaster() {
            None => true,
            Some(b) => self.is_own(b),
        }
    }
}
