//! Event adapter between a messaging transport and the command core.
//!
//! Connectors feed connectivity, presence and message events into an
//! [`EventAdapter`]; it gates them through the presence [`Registry`] and
//! hands authorized command bodies to the [`Dispatcher`].
//!
//! Connectivity follows `Disconnected → Connecting → Connected →
//! Disconnected`.  A new session resets presence (nobody is assumed online);
//! leaving `Connected` stops every tail.  A resumed connection continues the
//! earlier session, so the presence it already learned stays valid.

use std::sync::{Arc, RwLock};

use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::comm::{InboundMessage, PresenceEvent};
use crate::dispatch::Dispatcher;
use crate::presence::Registry;

/// Transport connectivity as seen by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug)]
struct AdapterState {
    connection: ConnectionState,
    /// The bot's own identity, learned at session start.
    self_id: Option<String>,
}

pub struct EventAdapter {
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    state: RwLock<AdapterState>,
}

impl EventAdapter {
    pub fn new(registry: Arc<Registry>, dispatcher: Dispatcher) -> Self {
        Self {
            registry,
            dispatcher,
            state: RwLock::new(AdapterState {
                connection: ConnectionState::Disconnected,
                self_id: None,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn connection(&self) -> ConnectionState {
        self.state
            .read()
            .map(|s| s.connection)
            .unwrap_or(ConnectionState::Disconnected)
    }

    fn set_connection(&self, next: ConnectionState) -> ConnectionState {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        let prev = state.connection;
        state.connection = next;
        if prev != next {
            debug!(from = ?prev, to = ?next, "connection state changed");
        }
        prev
    }

    /// The bot's own identity, once a session has started.
    pub fn self_id(&self) -> Option<String> {
        self.state.read().ok().and_then(|s| s.self_id.clone())
    }

    fn is_self(&self, id: &str) -> bool {
        self.state
            .read()
            .map(|s| s.self_id.as_deref() == Some(id))
            .unwrap_or(false)
    }

    /// The transport started (re)connecting.
    pub fn on_connecting(&self) {
        self.set_connection(ConnectionState::Connecting);
    }

    /// A session is established as `self_id`.
    ///
    /// Presence is reset; contacts become authorized again as their
    /// presence arrives.
    pub fn on_session_start(&self, self_id: &str) {
        {
            let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
            state.self_id = Some(self_id.to_string());
        }
        self.set_connection(ConnectionState::Connected);
        self.registry.reset();
        info!(
            self_id = %self_id,
            contacts = self.registry.contacts().len(),
            "session started, waiting for contact presence"
        );
    }

    /// The transport resumed an interrupted session.
    ///
    /// Events missed in between are replayed by the transport, so presence is
    /// kept as it is.
    pub fn on_resumed(&self) {
        let prev = self.set_connection(ConnectionState::Connected);
        info!(
            from = ?prev,
            online = self.registry.online_count(),
            "session resumed"
        );
    }

    /// The transport went away, voluntarily or not.  Stops every tail.
    pub async fn on_disconnect(&self) -> usize {
        let prev = self.set_connection(ConnectionState::Disconnected);
        let stopped = self.dispatcher.tails().stop_all().await;
        info!(from = ?prev, stopped, "disconnected");
        stopped
    }

    /// Gate and dispatch an inbound message.
    ///
    /// Returns the dispatch task when the message was accepted.
    pub fn on_message(&self, msg: InboundMessage) -> Option<JoinHandle<()>> {
        if !msg.kind.carries_commands() {
            trace!(sender = %msg.sender, kind = ?msg.kind, "ignoring non-chat message");
            return None;
        }
        if self.is_self(&msg.sender) || !self.registry.is_authorized(&msg.sender) {
            trace!(sender = %msg.sender, "ignoring message from unauthorized sender");
            return None;
        }
        Some(self.dispatcher.dispatch(&msg.sender, &msg.body))
    }

    /// Apply a presence update from an allow-listed contact.
    pub fn on_presence(&self, event: PresenceEvent) {
        if self.is_self(&event.sender) || !self.registry.is_contact(&event.sender) {
            return;
        }
        if event.kind.is_available() {
            self.registry.mark_online(&event.sender);
        } else {
            self.registry.mark_offline(&event.sender);
        }
    }
}
