//! Presence gateway boundary
//!
//! The gateway owns the real-time connection to the voice service. Voxlog only
//! needs two things from it: joining/leaving a channel's media stream, and a
//! stream of membership-change notifications.

pub mod relay;

use crate::error::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use relay::RelayGateway;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake!(
    /// Guild (server) identifier
    GuildId
);
snowflake!(
    /// Voice or text channel identifier
    ChannelId
);
snowflake!(
    /// User identifier
    UserId
);

/// A channel occupant as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,
    /// True for automated accounts, including our own
    #[serde(default)]
    pub bot: bool,
}

/// Membership-change notification for one channel.
///
/// Delivered at-least-once and unordered; `members` is the channel's full
/// occupant list after the change, not a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipUpdate {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    /// The member whose voice state changed
    pub member: UserId,
    #[serde(default)]
    pub members: Vec<Member>,
}

/// An established media connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionHandle {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Voice connection control
#[async_trait]
pub trait PresenceGateway: Send + Sync {
    /// Join a voice channel's media stream
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<ConnectionHandle, GatewayError>;

    /// Leave a previously joined channel
    async fn disconnect(&self, handle: ConnectionHandle) -> Result<(), GatewayError>;
}
