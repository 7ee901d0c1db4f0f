//! Discord transport binding.
//!
//! Contacts are Discord user ids (decimal strings).  Direct messages count
//! as `chat`, guild messages as `normal`, and any non-regular message kind
//! as `other`.  Presence comes from `presence_update` plus the member
//! presences delivered with each guild on connect.  A resumed gateway
//! session keeps the presence already known.  Replies always go out as
//! direct messages.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context as AnyhowContext};
use async_trait::async_trait;
use serenity::all::{ConnectionStage, ShardStageUpdateEvent};
use serenity::async_trait as serenity_async_trait;
use serenity::client::{Client, Context, EventHandler};
use serenity::http::Http;
use serenity::model::channel::{Message, MessageType};
use serenity::model::gateway::{GatewayIntents, Presence, Ready};
use serenity::model::guild::Guild;
use serenity::model::id::{ChannelId, UserId};
use serenity::model::user::OnlineStatus;
use tracing::{debug, info, warn};

use crate::comm::{InboundMessage, MessageKind, PresenceEvent, PresenceKind, Replier};
use crate::events::EventAdapter;

/// Discord rejects empty message bodies.
const EMPTY_BODY: &str = "\u{200b}";

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Sends replies as direct messages, caching each user's DM channel.
pub struct DiscordReplier {
    http: Arc<Http>,
    dm_channels: Mutex<HashMap<UserId, ChannelId>>,
}

impl DiscordReplier {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            dm_channels: Mutex::new(HashMap::new()),
        }
    }

    async fn dm_channel(&self, user: UserId) -> anyhow::Result<ChannelId> {
        let cached = self
            .dm_channels
            .lock()
            .map_err(|_| anyhow!("dm channel cache poisoned"))?
            .get(&user)
            .copied();
        if let Some(id) = cached {
            return Ok(id);
        }

        let channel = user
            .create_dm_channel(self.http.as_ref())
            .await
            .map_err(|e| anyhow!("failed to create DM channel for user {user}: {e:?}"))?;
        if let Ok(mut cache) = self.dm_channels.lock() {
            cache.insert(user, channel.id);
        }
        Ok(channel.id)
    }
}

#[async_trait]
impl Replier for DiscordReplier {
    async fn reply(&self, to: &str, body: &str) -> anyhow::Result<()> {
        let uid: u64 = to
            .parse()
            .with_context(|| format!("invalid user id: {to}"))?;
        let channel = self.dm_channel(UserId::new(uid)).await?;
        let body = if body.is_empty() { EMPTY_BODY } else { body };
        channel
            .say(self.http.as_ref(), body)
            .await
            .map_err(|e| anyhow!("discord DM send error: {e:?}"))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

struct Handler {
    adapter: Arc<EventAdapter>,
}

fn message_kind(msg: &Message) -> MessageKind {
    match msg.kind {
        MessageType::Regular | MessageType::InlineReply if msg.guild_id.is_none() => {
            MessageKind::Chat
        }
        MessageType::Regular | MessageType::InlineReply => MessageKind::Normal,
        _ => MessageKind::Other,
    }
}

fn presence_kind(status: OnlineStatus) -> PresenceKind {
    match status {
        OnlineStatus::Online | OnlineStatus::Idle | OnlineStatus::DoNotDisturb => {
            PresenceKind::Available
        }
        OnlineStatus::Offline | OnlineStatus::Invisible => PresenceKind::Unavailable,
        _ => PresenceKind::Unspecified,
    }
}

#[serenity_async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        ctx.set_presence(None, OnlineStatus::Online);
        self.adapter.on_session_start(&ready.user.id.to_string());
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "connected to Discord");
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        debug!(guild = %guild.id, presences = guild.presences.len(), "guild presences received");
        for presence in guild.presences.values() {
            self.adapter.on_presence(PresenceEvent {
                sender: presence.user.id.to_string(),
                kind: presence_kind(presence.status),
            });
        }
    }

    async fn presence_update(&self, _ctx: Context, presence: Presence) {
        self.adapter.on_presence(PresenceEvent {
            sender: presence.user.id.to_string(),
            kind: presence_kind(presence.status),
        });
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        debug!(
            author = %msg.author.id,
            content_len = msg.content.len(),
            "discord message received"
        );
        self.adapter.on_message(InboundMessage {
            sender: msg.author.id.to_string(),
            kind: message_kind(&msg),
            body: msg.content.clone(),
        });
    }

    async fn shard_stage_update(&self, _ctx: Context, event: ShardStageUpdateEvent) {
        match event.new {
            ConnectionStage::Disconnected => {
                self.adapter.on_disconnect().await;
            }
            // A fresh session is announced by `ready`; only a resume ends
            // here without one.
            ConnectionStage::Connected if event.old == ConnectionStage::Resuming => {
                self.adapter.on_resumed();
            }
            ConnectionStage::Connected => {}
            _ => self.adapter.on_connecting(),
        }
    }
}

/// Connect to Discord and process events until Ctrl-C or a fatal client
/// error.  Every tail is stopped before returning.
pub async fn run(adapter: Arc<EventAdapter>, token: &str) -> anyhow::Result<()> {
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILDS
        | GatewayIntents::GUILD_PRESENCES;

    adapter.on_connecting();
    let mut client = Client::builder(token, intents)
        .event_handler(Handler {
            adapter: Arc::clone(&adapter),
        })
        .await
        .context("failed to build Discord client")?;
    let shards = Arc::clone(&client.shard_manager);

    info!("starting Discord bot");
    let result = tokio::select! {
        res = client.start() => res.context("Discord client error"),
        sig = tokio::signal::ctrl_c() => {
            if let Err(e) = sig {
                warn!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("received Ctrl-C, shutting down…");
            Ok(())
        }
    };

    adapter.on_disconnect().await;
    shards.shutdown_all().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn away_statuses_count_as_available() {
        for status in [
            OnlineStatus::Online,
            OnlineStatus::Idle,
            OnlineStatus::DoNotDisturb,
        ] {
            assert_eq!(presence_kind(status), PresenceKind::Available);
        }
    }

    #[test]
    fn hidden_statuses_count_as_unavailable() {
        assert_eq!(
            presence_kind(OnlineStatus::Offline),
            PresenceKind::Unavailable
        );
        assert_eq!(
            presence_kind(OnlineStatus::Invisible),
            PresenceKind::Unavailable
        );
    }
}
