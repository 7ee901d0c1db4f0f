//! Transport-agnostic communication types.
//!
//! Provides the inbound event envelopes ([`InboundMessage`],
//! [`PresenceEvent`]) that any connector produces, and the outbound
//! [`Replier`] trait the core uses to push text back to a contact.
//!
//! The core never talks to a messaging network directly: connectors (see
//! [`crate::discord`]) translate their native events into these types and
//! implement [`Replier`] on top of their send primitive.

use std::sync::Mutex;

use async_trait::async_trait;

/// Opaque, stable contact identifier (a bare address on the transport).
pub type Contact = String;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Kind of an inbound message as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// One-to-one chat message.
    Chat,
    /// Plain message outside a chat thread.
    Normal,
    /// Anything else (group traffic, system notices, errors, ...).
    Other,
}

impl MessageKind {
    /// Only direct and normal messages carry commands.
    pub fn carries_commands(self) -> bool {
        matches!(self, MessageKind::Chat | MessageKind::Normal)
    }
}

/// A channel-agnostic inbound message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Bare identity of the author.
    pub sender: Contact,
    pub kind: MessageKind,
    /// Raw message body.
    pub body: String,
}

/// Presence type of an inbound presence event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceKind {
    Available,
    Unavailable,
    /// No explicit type on the wire; treated as [`PresenceKind::Available`].
    Unspecified,
}

impl PresenceKind {
    pub fn is_available(self) -> bool {
        !matches!(self, PresenceKind::Unavailable)
    }
}

/// A reachability update for one contact.
#[derive(Debug, Clone)]
pub struct PresenceEvent {
    pub sender: Contact,
    pub kind: PresenceKind,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Outbound send primitive: fire-and-forget text delivery to a contact.
///
/// Connectors implement this on top of their platform SDK.  Errors are
/// reported to the caller for logging only; no delivery confirmation is
/// assumed.
#[async_trait]
pub trait Replier: Send + Sync + 'static {
    /// Deliver `body` to `to`.
    async fn reply(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

/// Send a reply and log (rather than propagate) a delivery failure.
pub async fn send_reply(replier: &dyn Replier, to: &str, body: &str) {
    if let Err(e) = replier.reply(to, body).await {
        tracing::warn!(to = %to, error = %e, "failed to send reply");
    }
}

/// A [`Replier`] that records every reply in memory.
#[derive(Debug, Default)]
pub struct RecordingReplier {
    sent: Mutex<Vec<(Contact, String)>>,
}

impl RecordingReplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every `(recipient, body)` pair sent so far, in order.
    pub fn sent(&self) -> Vec<(Contact, String)> {
        self.sent
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Bodies sent to `to`, in order.
    pub fn sent_to(&self, to: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c == to)
            .map(|(_, b)| b)
            .collect()
    }
}

#[async_trait]
impl Replier for RecordingReplier {
    async fn reply(&self, to: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("recording replier lock poisoned"))?
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}
