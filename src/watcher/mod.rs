//! Presence watcher
//!
//! Consumes membership-change notifications and drives automatic transitions.
//! Each notification carries the channel's full member list, so the decision
//! is always made from current occupancy; a dropped or reordered notification
//! is corrected by the next one.

use crate::error::Result;
use crate::gateway::{ChannelId, MembershipUpdate, UserId};
use crate::session::{ClosedSummary, OccupancyChange, SessionHandle, SessionManager};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What a notification led to
#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    /// Not for a monitored channel, or caused by the bot itself
    Ignored,
    /// Occupancy already matches the scope's state
    Unchanged,
    Opened(SessionHandle),
    Closed(ClosedSummary),
    /// The manager reported an error (already logged)
    Failed,
}

/// Maps monitored voice channels to their scope managers
pub struct PresenceWatcher {
    bot_user_id: UserId,
    scopes: HashMap<ChannelId, SessionManager>,
}

impl PresenceWatcher {
    pub fn new(bot_user_id: UserId, managers: impl IntoIterator<Item = SessionManager>) -> Self {
        let scopes = managers
            .into_iter()
            .map(|m| (m.scope().voice_channel_id, m))
            .collect();
        PresenceWatcher {
            bot_user_id,
            scopes,
        }
    }

    /// Apply one notification
    pub async fn handle(&self, update: &MembershipUpdate) -> WatchOutcome {
        if update.member == self.bot_user_id {
            return WatchOutcome::Ignored;
        }

        let Some(manager) = self.scopes.get(&update.channel_id) else {
            return WatchOutcome::Ignored;
        };
        if manager.scope().guild_id != update.guild_id {
            tracing::debug!(
                "Ignoring update for channel {} from unexpected guild {}",
                update.channel_id,
                update.guild_id
            );
            return WatchOutcome::Ignored;
        }

        let occupied = update
            .members
            .iter()
            .any(|m| !m.bot && m.id != self.bot_user_id);

        match manager.apply_occupancy(occupied).await {
            Ok(OccupancyChange::Unchanged) => WatchOutcome::Unchanged,
            Ok(OccupancyChange::Opened(handle)) => WatchOutcome::Opened(handle),
            Ok(OccupancyChange::Closed(summary)) => WatchOutcome::Closed(summary),
            Err(e) => {
                tracing::warn!(
                    "Occupancy change failed for channel {}: {}",
                    update.channel_id,
                    e
                );
                WatchOutcome::Failed
            }
        }
    }
}

/// Handle for controlling the watcher task
pub struct WatcherHandle {
    /// Shutdown signal sender
    shutdown_tx: mpsc::Sender<()>,
}

impl WatcherHandle {
    /// Stop the watcher
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown_tx.send(()).await;
        Ok(())
    }
}

/// Consume notifications until the stream ends or the handle is stopped
pub fn start_watcher(
    watcher: Arc<PresenceWatcher>,
    mut updates: mpsc::Receiver<MembershipUpdate>,
) -> WatcherHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        tracing::info!(
            "Presence watcher started for {} channel(s)",
            watcher.scopes.len()
        );
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                update = updates.recv() => match update {
                    Some(update) => {
                        let outcome = watcher.handle(&update).await;
                        tracing::debug!(
                            "Membership update for channel {}: {:?}",
                            update.channel_id,
                            outcome
                        );
                    }
                    None => break,
                },
            }
        }
        tracing::info!("Presence watcher stopped");
    });

    WatcherHandle { shutdown_tx }
}
