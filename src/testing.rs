//! Test doubles shared by unit tests

use crate::config::{MonitoredScope, Recovery};
use crate::error::{GatewayError, StoreError};
use crate::gateway::{ChannelId, ConnectionHandle, GuildId, PresenceGateway};
use crate::session::{Actor, Clock, ManagerDeps, NewSession, Session};
use crate::store::{MemoryStore, SessionStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};

/// guild 10, voice channel 20, notifications to 30
pub fn scope() -> MonitoredScope {
    MonitoredScope {
        name: "lounge".to_string(),
        guild_id: GuildId(10),
        voice_channel_id: ChannelId(20),
        notification_channel_id: ChannelId(30),
    }
}

pub fn deps(
    store: Arc<dyn SessionStore>,
    gateway: Arc<dyn PresenceGateway>,
    clock: Arc<dyn Clock>,
) -> ManagerDeps {
    let (event_tx, _) = broadcast::channel(64);
    ManagerDeps {
        store,
        gateway,
        clock,
        event_tx,
        recovery: Recovery::Resume,
    }
}

/// Records connect/disconnect calls as "connect <channel>" strings
#[derive(Default)]
pub struct FakeGateway {
    calls: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl FakeGateway {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PresenceGateway for FakeGateway {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<ConnectionHandle, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Request("gateway down".to_string()));
        }
        self.calls
            .lock()
            .unwrap()
            .push(format!("connect {}", channel_id));
        Ok(ConnectionHandle {
            guild_id,
            channel_id,
        })
    }

    async fn disconnect(&self, handle: ConnectionHandle) -> Result<(), GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Request("gateway down".to_string()));
        }
        self.calls
            .lock()
            .unwrap()
            .push(format!("disconnect {}", handle.channel_id));
        Ok(())
    }
}

/// MemoryStore with switchable failures.
///
/// `overlapped` is set if an insert happens while the scope already has an
/// open row.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub fail_insert: AtomicBool,
    pub fail_close: AtomicBool,
    pub overlapped: AtomicBool,
}

fn injected() -> StoreError {
    StoreError::Task("injected failure".to_string())
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn insert(&self, new: NewSession) -> Result<Session, StoreError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(injected());
        }
        if self.inner.latest_open(&new.scope).await?.is_some() {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.inner.insert(new).await
    }

    async fn close(
        &self,
        id: &str,
        elapsed: Duration,
        closed_by: Actor,
        closed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.close(id, elapsed, closed_by, closed_at).await
    }

    async fn latest_open(&self, scope: &str) -> Result<Option<Session>, StoreError> {
        self.inner.latest_open(scope).await
    }

    async fn recent(&self, scope: &str, limit: usize) -> Result<Vec<Session>, StoreError> {
        self.inner.recent(scope, limit).await
    }
}

/// MemoryStore whose inserts wait for a release.
///
/// `entered` fires once an insert has started; `release` lets it finish.
#[derive(Default)]
pub struct GatedStore {
    inner: MemoryStore,
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl SessionStore for GatedStore {
    async fn insert(&self, new: NewSession) -> Result<Session, StoreError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.insert(new).await
    }

    async fn close(
        &self,
        id: &str,
        elapsed: Duration,
        closed_by: Actor,
        closed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.close(id, elapsed, closed_by, closed_at).await
    }

    async fn latest_open(&self, scope: &str) -> Result<Option<Session>, StoreError> {
        self.inner.latest_open(scope).await
    }

    async fn recent(&self, scope: &str, limit: usize) -> Result<Vec<Session>, StoreError> {
        self.inner.recent(scope, limit).await
    }
}
