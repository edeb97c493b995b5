//! Relay gateway
//!
//! Voxlog does not speak the voice protocol itself. Connect and disconnect
//! requests are published on the event bus; a relay process subscribed to
//! `/api/events` performs the actual join/leave and feeds membership changes
//! back through `/api/presence`.

use super::{ChannelId, ConnectionHandle, GuildId, PresenceGateway};
use crate::error::GatewayError;
use crate::events::SessionEvent;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Gateway that forwards connection requests to an external relay
#[derive(Clone)]
pub struct RelayGateway {
    event_tx: broadcast::Sender<SessionEvent>,
}

impl RelayGateway {
    pub fn new(event_tx: broadcast::Sender<SessionEvent>) -> Self {
        RelayGateway { event_tx }
    }

    fn publish(&self, event: SessionEvent) -> Result<(), GatewayError> {
        self.event_tx
            .send(event)
            .map(|_| ())
            .map_err(|_| GatewayError::NoRelay)
    }
}

#[async_trait]
impl PresenceGateway for RelayGateway {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<ConnectionHandle, GatewayError> {
        self.publish(SessionEvent::GatewayConnect {
            guild_id,
            channel_id,
        })?;
        tracing::debug!("Requested voice join: guild {} channel {}", guild_id, channel_id);
        Ok(ConnectionHandle {
            guild_id,
            channel_id,
        })
    }

    async fn disconnect(&self, handle: ConnectionHandle) -> Result<(), GatewayError> {
        self.publish(SessionEvent::GatewayDisconnect {
            guild_id: handle.guild_id,
            channel_id: handle.channel_id,
        })?;
        tracing::debug!(
            "Requested voice leave: guild {} channel {}",
            handle.guild_id,
            handle.channel_id
        );
        Ok(())
    }
}
