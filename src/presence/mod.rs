//! Authorization registry: static contact allow-list plus the live set of
//! contacts currently reported reachable.
//!
//! A contact is authorized to issue commands only while it is both on the
//! allow-list and online.  Everybody starts offline, including right after a
//! (re)connect, until a presence event says otherwise.

use std::collections::HashSet;
use std::sync::RwLock;

use tracing::{debug, info};

use crate::comm::Contact;

/// Tracks who may talk to the bot right now.
#[derive(Debug)]
pub struct Registry {
    contacts: Vec<Contact>,
    online: RwLock<HashSet<Contact>>,
}

impl Registry {
    /// Build a registry from the configured allow-list.  Nobody is online.
    pub fn new(contacts: impl IntoIterator<Item = Contact>) -> Self {
        Self {
            contacts: contacts.into_iter().collect(),
            online: RwLock::new(HashSet::new()),
        }
    }

    /// Allow-listed contacts in configuration order.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn is_contact(&self, id: &str) -> bool {
        self.contacts.iter().any(|c| c == id)
    }

    pub fn is_online(&self, id: &str) -> bool {
        self.online
            .read()
            .map(|set| set.contains(id))
            .unwrap_or(false)
    }

    /// The gate applied to every inbound message.
    pub fn is_authorized(&self, id: &str) -> bool {
        self.is_contact(id) && self.is_online(id)
    }

    /// Mark `id` reachable.  Non-contacts are ignored.  Idempotent.
    pub fn mark_online(&self, id: &str) {
        if !self.is_contact(id) {
            return;
        }
        let inserted = match self.online.write() {
            Ok(mut set) => set.insert(id.to_string()),
            Err(_) => return,
        };
        if inserted {
            info!(contact = %id, "now online");
        }
    }

    /// Mark `id` unreachable.  A no-op when `id` was not online.
    pub fn mark_offline(&self, id: &str) {
        let removed = match self.online.write() {
            Ok(mut set) => set.remove(id),
            Err(_) => return,
        };
        if removed {
            info!(contact = %id, "now offline");
        }
    }

    /// Forget every presence; used when a new session starts.
    pub fn reset(&self) {
        if let Ok(mut set) = self.online.write() {
            debug!(cleared = set.len(), "presence state reset");
            set.clear();
        }
    }

    /// Number of contacts currently online.
    pub fn online_count(&self) -> usize {
        self.online.read().map(|s| s.len()).unwrap_or(0)
    }
}
