//! Session events
//!
//! Broadcast to SSE subscribers. The relay process posts `message` to the
//! scope's notification channel and performs voice joins on gateway requests.

use crate::gateway::{ChannelId, GuildId};
use crate::session::Actor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events emitted by scope managers and the relay gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session was opened
    Opened {
        scope: String,
        session_id: String,
        title: Option<String>,
        start_time: DateTime<Utc>,
        actor: Actor,
        notify_channel: ChannelId,
        message: String,
    },
    /// A session was closed
    Closed {
        scope: String,
        session_id: String,
        elapsed_ms: i64,
        actor: Actor,
        /// False when the row update failed
        persisted: bool,
        notify_channel: ChannelId,
        message: String,
    },
    /// Request to join a voice channel
    GatewayConnect {
        guild_id: GuildId,
        channel_id: ChannelId,
    },
    /// Request to leave a voice channel
    GatewayDisconnect {
        guild_id: GuildId,
        channel_id: ChannelId,
    },
}

impl SessionEvent {
    /// Get the SSE event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::Opened { .. } => "session:opened",
            SessionEvent::Closed { .. } => "session:closed",
            SessionEvent::GatewayConnect { .. } => "gateway:connect",
            SessionEvent::GatewayDisconnect { .. } => "gateway:disconnect",
        }
    }
}
