//! Session registry model.
//!
//! The relay owns the authoritative [`Session`]; every client keeps a cached
//! copy that is replaced wholesale on each `user-list` snapshot.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of a relay-assigned client id.
pub const CLIENT_ID_LEN: usize = 8;

/// Prefix of the display name given to a client before it picks one.
pub const DEFAULT_NAME_PREFIX: &str = "Guest_";

/// Opaque client identity token assigned by the relay on connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Wrap an existing id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh short id from a v4 UUID.
    #[must_use]
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(simple[..CLIENT_ID_LEN].to_string())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The display name a client gets before choosing its own.
    #[must_use]
    pub fn default_name(&self) -> String {
        format!("{DEFAULT_NAME_PREFIX}{}", self.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A connected client as seen by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Relay-assigned id, immutable for the connection's lifetime.
    pub id: ClientId,
    /// Mutable display name.
    pub display_name: String,
    /// Whether this client is the current broadcaster.
    pub is_broadcaster: bool,
}

/// Wire form of one `user-list` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    /// Client id.
    pub id: ClientId,
    /// Display name.
    pub name: String,
}

/// Connected clients plus the single optional broadcaster.
///
/// `broadcaster`, when set, always names an entry of `clients`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    clients: HashMap<ClientId, String>,
    broadcaster: Option<ClientId>,
}

impl Session {
    /// Create an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a session from a `user-list` snapshot.
    ///
    /// A broadcaster that is not among `users` is dropped so the invariant
    /// holds even for a malformed snapshot.
    #[must_use]
    pub fn from_snapshot(users: &[UserEntry], broadcaster: Option<ClientId>) -> Self {
        let clients: HashMap<_, _> = users
            .iter()
            .map(|u| (u.id.clone(), u.name.clone()))
            .collect();
        let broadcaster = broadcaster.filter(|b| clients.contains_key(b));
        Self {
            clients,
            broadcaster,
        }
    }

    /// Add a client with the given display name.
    ///
    /// Returns false if the id is already present.
    pub fn join(&mut self, id: ClientId, display_name: String) -> bool {
        if self.clients.contains_key(&id) {
            return false;
        }
        self.clients.insert(id, display_name);
        true
    }

    /// Remove a client, clearing the broadcaster if it was them.
    ///
    /// Returns true if the client was present.
    pub fn leave(&mut self, id: &ClientId) -> bool {
        if self.clients.remove(id).is_none() {
            return false;
        }
        if self.broadcaster.as_ref() == Some(id) {
            self.broadcaster = None;
        }
        true
    }

    /// Change a client's display name. Returns false for unknown clients.
    pub fn rename(&mut self, id: &ClientId, display_name: String) -> bool {
        match self.clients.get_mut(id) {
            Some(name) => {
                *name = display_name;
                true
            }
            None => false,
        }
    }

    /// Claim the broadcaster slot. First writer wins.
    ///
    /// Returns true only if `id` became the broadcaster.
    pub fn start_share(&mut self, id: &ClientId) -> bool {
        if self.broadcaster.is_some() || !self.clients.contains_key(id) {
            return false;
        }
        self.broadcaster = Some(id.clone());
        true
    }

    /// Release the broadcaster slot if `id` holds it.
    pub fn stop_share(&mut self, id: &ClientId) -> bool {
        if self.broadcaster.as_ref() != Some(id) {
            return false;
        }
        self.broadcaster = None;
        true
    }

    /// Current broadcaster, if any.
    #[must_use]
    pub fn broadcaster(&self) -> Option<&ClientId> {
        self.broadcaster.as_ref()
    }

    /// Whether `id` is connected.
    #[must_use]
    pub fn contains(&self, id: &ClientId) -> bool {
        self.clients.contains_key(id)
    }

    /// Display name of a client.
    #[must_use]
    pub fn display_name(&self, id: &ClientId) -> Option<&str> {
        self.clients.get(id).map(String::as_str)
    }

    /// Number of connected clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Connected client ids, sorted.
    #[must_use]
    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<_> = self.clients.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Full identities, sorted by id.
    #[must_use]
    pub fn identities(&self) -> Vec<ClientIdentity> {
        self.client_ids()
            .into_iter()
            .map(|id| ClientIdentity {
                display_name: self.clients[&id].clone(),
                is_broadcaster: self.broadcaster.as_ref() == Some(&id),
                id,
            })
            .collect()
    }

    /// Wire entries for a `user-list` snapshot, sorted by id.
    #[must_use]
    pub fn user_entries(&self) -> Vec<UserEntry> {
        self.client_ids()
            .into_iter()
            .map(|id| UserEntry {
                name: self.clients[&id].clone(),
                id,
            })
            .collect()
    }
}
