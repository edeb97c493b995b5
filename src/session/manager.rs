//! Session lifecycle manager
//!
//! Each monitored scope runs one actor task that owns the scope's current open
//! session and its voice connection. Watcher and command handlers hold a
//! cloneable [`SessionManager`] and post intents to the actor's queue; the actor
//! handles them strictly one at a time, so every intent sees the state left by
//! the previous one. On close the in-memory session is cleared before the store
//! update is awaited. Decisions that depend on whether a session is open
//! (occupancy changes, manual start) are made inside the actor, never from the
//! published snapshot.

use super::format::format_duration;
use super::{Actor, ClosedSummary, Clock, NewSession, Session, SessionHandle};
use crate::config::{MonitoredScope, Recovery};
use crate::error::{CloseError, GatewayError, OccupancyError, OpenError, StoreError};
use crate::events::SessionEvent;
use crate::gateway::{ChannelId, ConnectionHandle, PresenceGateway};
use crate::store::SessionStore;
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Queue depth per scope
const INTENT_QUEUE: usize = 64;

/// Collaborators shared by every scope
#[derive(Clone)]
pub struct ManagerDeps {
    pub store: Arc<dyn SessionStore>,
    pub gateway: Arc<dyn PresenceGateway>,
    pub clock: Arc<dyn Clock>,
    pub event_tx: broadcast::Sender<SessionEvent>,
    pub recovery: Recovery,
}

/// What an occupancy change did to the scope
#[derive(Debug, Clone, PartialEq)]
pub enum OccupancyChange {
    /// Occupancy already matched the scope's state
    Unchanged,
    Opened(SessionHandle),
    Closed(ClosedSummary),
}

enum Intent {
    Open {
        title: Option<String>,
        actor: Actor,
        /// Channel to join before the session starts
        join: Option<ChannelId>,
        reply: oneshot::Sender<Result<SessionHandle, OpenError>>,
    },
    Occupancy {
        occupied: bool,
        reply: oneshot::Sender<Result<OccupancyChange, OccupancyError>>,
    },
    Close {
        actor: Actor,
        reply: oneshot::Sender<Result<ClosedSummary, CloseError>>,
    },
    Connect {
        channel_id: ChannelId,
        reply: oneshot::Sender<Result<ConnectionHandle, GatewayError>>,
    },
}

/// Handle to one scope's lifecycle actor
#[derive(Clone)]
pub struct SessionManager {
    scope: Arc<MonitoredScope>,
    store: Arc<dyn SessionStore>,
    tx: mpsc::Sender<Intent>,
    state_rx: watch::Receiver<Option<SessionHandle>>,
}

impl SessionManager {
    /// Spawn the actor for a scope.
    ///
    /// A session left open by a previous run is resumed or closed according
    /// to `deps.recovery`. Store failures here are logged and the scope starts
    /// with nothing open.
    pub async fn start(scope: MonitoredScope, deps: ManagerDeps) -> Self {
        let scope = Arc::new(scope);
        let current = recover(&scope, &deps).await;

        let (tx, rx) = mpsc::channel(INTENT_QUEUE);
        let (state_tx, state_rx) = watch::channel(current.clone());

        let mut actor = ScopeActor {
            scope: Arc::clone(&scope),
            store: Arc::clone(&deps.store),
            gateway: deps.gateway,
            clock: deps.clock,
            event_tx: deps.event_tx,
            current,
            connection: None,
            state_tx,
        };
        // A resumed automatic session keeps the bot in the monitored channel
        let rejoin = actor
            .current
            .as_ref()
            .is_some_and(|h| h.opened_by == Actor::Automatic);
        if rejoin {
            let _ = actor.connect(scope.voice_channel_id).await;
        }
        tokio::spawn(actor.run(rx));

        tracing::info!(
            "Scope '{}' monitoring voice channel {}",
            scope.name,
            scope.voice_channel_id
        );

        SessionManager {
            scope,
            store: deps.store,
            tx,
            state_rx,
        }
    }

    pub fn scope(&self) -> &MonitoredScope {
        &self.scope
    }

    /// The open session as of the last processed intent.
    /// For display only; an intent already queued may change it.
    pub fn current(&self) -> Option<SessionHandle> {
        self.state_rx.borrow().clone()
    }

    pub fn is_open(&self) -> bool {
        self.state_rx.borrow().is_some()
    }

    /// Open a session.
    ///
    /// If one is already open, a manual request fails with `AlreadyOpen` and
    /// an automatic request returns the existing handle.
    pub async fn request_open(
        &self,
        title: Option<String>,
        actor: Actor,
    ) -> Result<SessionHandle, OpenError> {
        self.send_open(title, actor, None).await
    }

    /// Join `channel_id` and open a manual session, as one step.
    ///
    /// Fails with `AlreadyOpen` without touching the connection if a session
    /// is open. A failed join is logged and the session still starts.
    pub async fn request_start(
        &self,
        title: Option<String>,
        channel_id: ChannelId,
    ) -> Result<SessionHandle, OpenError> {
        self.send_open(title, Actor::Manual, Some(channel_id)).await
    }

    async fn send_open(
        &self,
        title: Option<String>,
        actor: Actor,
        join: Option<ChannelId>,
    ) -> Result<SessionHandle, OpenError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Intent::Open {
                title,
                actor,
                join,
                reply,
            })
            .await
            .map_err(|_| OpenError::Unavailable(self.scope.name.clone()))?;
        rx.await
            .map_err(|_| OpenError::Unavailable(self.scope.name.clone()))?
    }

    /// Reconcile the scope with its channel's occupancy.
    ///
    /// Occupied with nothing open opens an automatic session; empty with a
    /// session open closes it automatically. Anything else is `Unchanged`.
    pub async fn apply_occupancy(
        &self,
        occupied: bool,
    ) -> Result<OccupancyChange, OccupancyError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Intent::Occupancy { occupied, reply })
            .await
            .map_err(|_| OccupancyError::Unavailable(self.scope.name.clone()))?;
        rx.await
            .map_err(|_| OccupancyError::Unavailable(self.scope.name.clone()))?
    }

    /// Close the open session
    pub async fn request_close(&self, actor: Actor) -> Result<ClosedSummary, CloseError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Intent::Close { actor, reply })
            .await
            .map_err(|_| CloseError::Unavailable(self.scope.name.clone()))?;
        rx.await
            .map_err(|_| CloseError::Unavailable(self.scope.name.clone()))?
    }

    /// Join `channel_id` through the scope's connection slot.
    /// No-op if already connected there.
    pub async fn ensure_connected(
        &self,
        channel_id: ChannelId,
    ) -> Result<ConnectionHandle, GatewayError> {
        let unavailable = || GatewayError::Unavailable(self.scope.name.clone());
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Intent::Connect { channel_id, reply })
            .await
            .map_err(|_| unavailable())?;
        rx.await.map_err(|_| unavailable())?
    }

    /// Most recent sessions for this scope, newest first
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        self.store.recent(&self.scope.name, limit).await
    }
}

async fn recover(scope: &MonitoredScope, deps: &ManagerDeps) -> Option<SessionHandle> {
    let session = match deps.store.latest_open(&scope.name).await {
        Ok(Some(session)) => session,
        Ok(None) => return None,
        Err(e) => {
            tracing::error!("Scope '{}': failed to look up open session: {}", scope.name, e);
            return None;
        }
    };

    match deps.recovery {
        Recovery::Resume => {
            tracing::info!(
                "Scope '{}': resuming session {} started at {}",
                scope.name,
                session.id,
                session.start_time
            );
            Some(SessionHandle::from(&session))
        }
        Recovery::Close => {
            let now = deps.clock.now();
            let elapsed = (now - session.start_time).max(Duration::zero());
            match deps
                .store
                .close(&session.id, elapsed, Actor::Automatic, now)
                .await
            {
                Ok(()) => tracing::info!(
                    "Scope '{}': closed leftover session {} ({})",
                    scope.name,
                    session.id,
                    format_duration(elapsed)
                ),
                Err(e) => tracing::error!(
                    "Scope '{}': failed to close leftover session {}: {}",
                    scope.name,
                    session.id,
                    e
                ),
            }
            None
        }
    }
}

/// Owner of one scope's mutable state
struct ScopeActor {
    scope: Arc<MonitoredScope>,
    store: Arc<dyn SessionStore>,
    gateway: Arc<dyn PresenceGateway>,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<SessionEvent>,
    current: Option<SessionHandle>,
    connection: Option<ConnectionHandle>,
    state_tx: watch::Sender<Option<SessionHandle>>,
}

impl ScopeActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Intent>) {
        while let Some(intent) = rx.recv().await {
            match intent {
                Intent::Open {
                    title,
                    actor,
                    join,
                    reply,
                } => {
                    let result = self.open(title, actor, join).await;
                    let _ = reply.send(result);
                }
                Intent::Occupancy { occupied, reply } => {
                    let result = self.reconcile(occupied).await;
                    let _ = reply.send(result);
                }
                Intent::Close { actor, reply } => {
                    let result = self.close(actor).await;
                    let _ = reply.send(result);
                }
                Intent::Connect { channel_id, reply } => {
                    let result = self.connect(channel_id).await;
                    let _ = reply.send(result);
                }
            }
        }
        tracing::debug!("Scope '{}' manager stopped", self.scope.name);
    }

    fn set_current(&mut self, current: Option<SessionHandle>) {
        self.current = current;
        self.state_tx.send_replace(self.current.clone());
    }

    async fn reconcile(&mut self, occupied: bool) -> Result<OccupancyChange, OccupancyError> {
        match (occupied, self.current.is_some()) {
            (true, false) => Ok(OccupancyChange::Opened(
                self.open(None, Actor::Automatic, None).await?,
            )),
            (false, true) => Ok(OccupancyChange::Closed(self.close(Actor::Automatic).await?)),
            _ => Ok(OccupancyChange::Unchanged),
        }
    }

    async fn open(
        &mut self,
        title: Option<String>,
        actor: Actor,
        join: Option<ChannelId>,
    ) -> Result<SessionHandle, OpenError> {
        if let Some(existing) = &self.current {
            return match actor {
                Actor::Manual => Err(OpenError::AlreadyOpen),
                Actor::Automatic => Ok(existing.clone()),
            };
        }

        if let Some(channel_id) = join {
            // Timing proceeds even if the join fails
            let _ = self.connect(channel_id).await;
        }

        let new = NewSession {
            scope: self.scope.name.clone(),
            title,
            start_time: self.clock.now(),
            opened_by: actor,
        };
        let session = self.store.insert(new).await.map_err(|e| {
            tracing::error!("Scope '{}': failed to record session start: {}", self.scope.name, e);
            OpenError::Store(e)
        })?;

        let handle = SessionHandle::from(&session);
        self.set_current(Some(handle.clone()));
        tracing::info!(
            "Scope '{}': session {} opened ({})",
            self.scope.name,
            handle.id,
            actor.as_str()
        );

        if actor == Actor::Automatic {
            // Connection failures never undo the transition
            let _ = self.connect(self.scope.voice_channel_id).await;
        }

        let message = match actor {
            Actor::Automatic => "VC の利用を検知しました。計測を開始します。".to_string(),
            Actor::Manual => match &handle.title {
                Some(title) => format!("計測を開始しました: {}", title),
                None => "計測を開始しました。".to_string(),
            },
        };
        let _ = self.event_tx.send(SessionEvent::Opened {
            scope: self.scope.name.clone(),
            session_id: handle.id.clone(),
            title: handle.title.clone(),
            start_time: handle.start_time,
            actor,
            notify_channel: self.scope.notification_channel_id,
            message,
        });

        Ok(handle)
    }

    async fn close(&mut self, actor: Actor) -> Result<ClosedSummary, CloseError> {
        let Some(open) = self.current.take() else {
            return Err(CloseError::NothingOpen);
        };
        self.set_current(None);

        let now = self.clock.now();
        let elapsed = (now - open.start_time).max(Duration::zero());
        let summary = ClosedSummary {
            id: open.id,
            title: open.title,
            start_time: open.start_time,
            elapsed_ms: elapsed.num_milliseconds(),
        };

        let persisted = self.store.close(&summary.id, elapsed, actor, now).await;
        if let Err(e) = &persisted {
            tracing::error!(
                "Scope '{}': session {} closed but not persisted: {}",
                self.scope.name,
                summary.id,
                e
            );
        } else {
            tracing::info!(
                "Scope '{}': session {} closed after {} ({})",
                self.scope.name,
                summary.id,
                format_duration(elapsed),
                actor.as_str()
            );
        }

        if actor == Actor::Automatic {
            self.disconnect().await;
        }

        let mut message = format!("VC 滞在時間: {}", format_duration(elapsed));
        if actor == Actor::Automatic {
            message.push_str("（自動退出）");
        }
        let _ = self.event_tx.send(SessionEvent::Closed {
            scope: self.scope.name.clone(),
            session_id: summary.id.clone(),
            elapsed_ms: summary.elapsed_ms,
            actor,
            persisted: persisted.is_ok(),
            notify_channel: self.scope.notification_channel_id,
            message,
        });

        match persisted {
            Ok(()) => Ok(summary),
            Err(source) => Err(CloseError::NotPersisted { summary, source }),
        }
    }

    async fn connect(&mut self, channel_id: ChannelId) -> Result<ConnectionHandle, GatewayError> {
        if let Some(handle) = self.connection {
            if handle.channel_id == channel_id {
                return Ok(handle);
            }
            self.disconnect().await;
        }

        match self.gateway.connect(self.scope.guild_id, channel_id).await {
            Ok(handle) => {
                self.connection = Some(handle);
                Ok(handle)
            }
            Err(e) => {
                tracing::warn!(
                    "Scope '{}': failed to join channel {}: {}",
                    self.scope.name,
                    channel_id,
                    e
                );
                Err(e)
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(handle) = self.connection.take() {
            if let Err(e) = self.gateway.disconnect(handle).await {
                tracing::warn!(
                    "Scope '{}': failed to leave channel {}: {}",
                    self.scope.name,
                    handle.channel_id,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::clock::ManualClock;
    use crate::store::MemoryStore;
    use crate::testing::{deps, scope, FakeGateway, FlakyStore, GatedStore};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::Ordering;

    struct Fixture {
        manager: SessionManager,
        store: Arc<FlakyStore>,
        gateway: Arc<FakeGateway>,
        clock: Arc<ManualClock>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(FlakyStore::default());
        let gateway = Arc::new(FakeGateway::default());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap(),
        ));
        let manager =
            SessionManager::start(scope(), deps(store.clone(), gateway.clone(), clock.clone()))
                .await;
        Fixture {
            manager,
            store,
            gateway,
            clock,
        }
    }

    async fn rows(f: &Fixture) -> Vec<Session> {
        f.store.recent("lounge", 100).await.unwrap()
    }

    #[tokio::test]
    async fn test_manual_open_while_open_is_rejected() {
        let f = fixture().await;
        f.manager
            .request_open(Some("study".into()), Actor::Manual)
            .await
            .unwrap();

        let second = f.manager.request_open(None, Actor::Manual).await;
        assert!(matches!(second, Err(OpenError::AlreadyOpen)));
        assert_eq!(rows(&f).await.len(), 1);
    }

    #[tokio::test]
    async fn test_automatic_open_while_open_returns_existing() {
        let f = fixture().await;
        let first = f
            .manager
            .request_open(Some("study".into()), Actor::Manual)
            .await
            .unwrap();

        let second = f.manager.request_open(None, Actor::Automatic).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(rows(&f).await.len(), 1);
        // The existing session was manual, so no automatic connect happened
        assert!(f.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_close_twice() {
        let f = fixture().await;
        f.manager.request_open(None, Actor::Manual).await.unwrap();

        let summary = f.manager.request_close(Actor::Manual).await.unwrap();
        assert!(summary.elapsed_ms >= 0);

        let second = f.manager.request_close(Actor::Manual).await;
        assert!(matches!(second, Err(CloseError::NothingOpen)));
    }

    #[tokio::test]
    async fn test_close_with_nothing_open() {
        let f = fixture().await;
        let result = f.manager.request_close(Actor::Automatic).await;
        assert!(matches!(result, Err(CloseError::NothingOpen)));
        assert!(f.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_125_seconds() {
        let f = fixture().await;
        let handle = f.manager.request_open(None, Actor::Manual).await.unwrap();
        f.clock.advance(Duration::seconds(125));

        let summary = f.manager.request_close(Actor::Manual).await.unwrap();
        assert_eq!(summary.id, handle.id);
        assert_eq!(summary.elapsed(), Duration::seconds(125));
        assert_eq!(format_duration(summary.elapsed()), "0時間2分5秒");

        let stored = rows(&f).await;
        assert_eq!(stored[0].elapsed_ms, Some(125_000));
        assert_eq!(stored[0].closed_by, Some(Actor::Manual));
    }

    #[tokio::test]
    async fn test_sub_second_precision_is_kept() {
        let f = fixture().await;
        f.manager.request_open(None, Actor::Manual).await.unwrap();
        f.clock.advance(Duration::milliseconds(1_500));

        let summary = f.manager.request_close(Actor::Manual).await.unwrap();
        assert_eq!(summary.elapsed_ms, 1_500);
    }

    #[tokio::test]
    async fn test_store_failure_on_close_still_closes_scope() {
        let f = fixture().await;
        f.manager.request_open(None, Actor::Manual).await.unwrap();
        f.clock.advance(Duration::seconds(10));
        f.store.fail_close.store(true, Ordering::SeqCst);

        let result = f.manager.request_close(Actor::Manual).await;
        match result {
            Err(CloseError::NotPersisted { summary, .. }) => {
                assert_eq!(summary.elapsed_ms, 10_000)
            }
            other => panic!("expected NotPersisted, got {:?}", other),
        }
        assert!(!f.manager.is_open());

        f.store.fail_close.store(false, Ordering::SeqCst);
        assert!(f.manager.request_open(None, Actor::Manual).await.is_ok());
    }

    #[tokio::test]
    async fn test_store_failure_on_open_leaves_scope_closed() {
        let f = fixture().await;
        f.store.fail_insert.store(true, Ordering::SeqCst);

        let result = f.manager.request_open(None, Actor::Automatic).await;
        assert!(matches!(result, Err(OpenError::Store(_))));
        assert!(!f.manager.is_open());
        assert!(f.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_automatic_transitions_manage_connection() {
        let f = fixture().await;
        f.manager.request_open(None, Actor::Automatic).await.unwrap();
        f.manager.request_close(Actor::Automatic).await.unwrap();

        assert_eq!(f.gateway.calls(), vec!["connect 20", "disconnect 20"]);
    }

    #[tokio::test]
    async fn test_manual_close_keeps_connection() {
        let f = fixture().await;
        f.manager.request_open(None, Actor::Automatic).await.unwrap();
        f.manager.request_close(Actor::Manual).await.unwrap();

        assert_eq!(f.gateway.calls(), vec!["connect 20"]);

        // Already connected to the monitored channel: no second connect
        f.manager.request_open(None, Actor::Automatic).await.unwrap();
        assert_eq!(f.gateway.calls(), vec!["connect 20"]);
    }

    #[tokio::test]
    async fn test_gateway_failure_does_not_block_open() {
        let f = fixture().await;
        f.gateway.fail.store(true, Ordering::SeqCst);

        let handle = f.manager.request_open(None, Actor::Automatic).await.unwrap();
        assert_eq!(f.manager.current(), Some(handle));

        let summary = f.manager.request_close(Actor::Automatic).await;
        assert!(summary.is_ok());
    }

    #[tokio::test]
    async fn test_ensure_connected_switches_channel() {
        let f = fixture().await;
        f.manager.ensure_connected(ChannelId(20)).await.unwrap();
        f.manager.ensure_connected(ChannelId(20)).await.unwrap();
        f.manager.ensure_connected(ChannelId(21)).await.unwrap();

        assert_eq!(
            f.gateway.calls(),
            vec!["connect 20", "disconnect 20", "connect 21"]
        );
    }

    #[tokio::test]
    async fn test_events_published() {
        let f = fixture().await;
        let (tx, mut rx) = broadcast::channel(8);
        let manager = SessionManager::start(
            scope(),
            ManagerDeps {
                event_tx: tx,
                ..deps(f.store.clone(), f.gateway.clone(), f.clock.clone())
            },
        )
        .await;

        manager.request_open(None, Actor::Automatic).await.unwrap();
        f.clock.advance(Duration::seconds(65));
        manager.request_close(Actor::Automatic).await.unwrap();

        let opened = rx.recv().await.unwrap();
        assert_eq!(opened.event_type(), "session:opened");
        match rx.recv().await.unwrap() {
            SessionEvent::Closed {
                message,
                notify_channel,
                persisted,
                ..
            } => {
                assert_eq!(message, "VC 滞在時間: 0時間1分5秒（自動退出）");
                assert_eq!(notify_channel, ChannelId(30));
                assert!(persisted);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_interleaved_requests_keep_one_open_session() {
        let f = fixture().await;
        let mut tasks = Vec::new();
        for i in 0..200u32 {
            let manager = f.manager.clone();
            tasks.push(tokio::spawn(async move {
                let actor = if i % 3 == 0 {
                    Actor::Manual
                } else {
                    Actor::Automatic
                };
                if i % 2 == 0 {
                    let _ = manager.request_open(None, actor).await;
                } else {
                    let _ = manager.request_close(actor).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(!f.store.overlapped.load(Ordering::SeqCst));
        let open: Vec<_> = rows(&f).await.into_iter().filter(|s| s.is_open()).collect();
        assert!(open.len() <= 1);
        assert_eq!(
            open.first().map(|s| s.id.clone()),
            f.manager.current().map(|h| h.id)
        );
    }

    #[tokio::test]
    async fn test_close_during_pending_open_waits_for_it() {
        let store = Arc::new(GatedStore::default());
        let manager = SessionManager::start(
            scope(),
            deps(
                store.clone(),
                Arc::new(FakeGateway::default()),
                Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap())),
            ),
        )
        .await;

        let opening = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.request_open(None, Actor::Manual).await })
        };
        store.entered.notified().await;

        let closing = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.request_close(Actor::Manual).await })
        };
        tokio::task::yield_now().await;
        store.release.notify_one();

        let handle = opening.await.unwrap().unwrap();
        let summary = closing.await.unwrap().unwrap();
        assert_eq!(summary.id, handle.id);
        assert!(!manager.is_open());
    }

    #[tokio::test]
    async fn test_occupancy_changes() {
        let f = fixture().await;
        assert_eq!(
            f.manager.apply_occupancy(false).await.unwrap(),
            OccupancyChange::Unchanged
        );

        let opened = f.manager.apply_occupancy(true).await.unwrap();
        let OccupancyChange::Opened(handle) = opened else {
            panic!("expected Opened, got {:?}", opened);
        };
        assert_eq!(handle.opened_by, Actor::Automatic);
        assert_eq!(
            f.manager.apply_occupancy(true).await.unwrap(),
            OccupancyChange::Unchanged
        );

        f.clock.advance(Duration::seconds(3));
        match f.manager.apply_occupancy(false).await.unwrap() {
            OccupancyChange::Closed(summary) => assert_eq!(summary.elapsed_ms, 3_000),
            other => panic!("expected Closed, got {:?}", other),
        }
        assert_eq!(rows(&f).await[0].closed_by, Some(Actor::Automatic));
        assert_eq!(f.gateway.calls(), vec!["connect 20", "disconnect 20"]);
    }

    #[tokio::test]
    async fn test_start_while_open_keeps_connection() {
        let f = fixture().await;
        f.manager.request_open(None, Actor::Automatic).await.unwrap();

        let result = f.manager.request_start(None, ChannelId(42)).await;
        assert!(matches!(result, Err(OpenError::AlreadyOpen)));
        assert_eq!(f.gateway.calls(), vec!["connect 20"]);
    }

    #[tokio::test]
    async fn test_start_joins_then_opens() {
        let f = fixture().await;
        let handle = f
            .manager
            .request_start(Some("focus".into()), ChannelId(42))
            .await
            .unwrap();
        assert_eq!(handle.opened_by, Actor::Manual);
        assert_eq!(f.gateway.calls(), vec!["connect 42"]);
    }

    #[tokio::test]
    async fn test_stopped_scope_is_unavailable() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (_state_tx, state_rx) = watch::channel(None);
        let manager = SessionManager {
            scope: Arc::new(scope()),
            store: Arc::new(MemoryStore::new()),
            tx,
            state_rx,
        };

        assert_eq!(
            manager.ensure_connected(ChannelId(20)).await,
            Err(GatewayError::Unavailable("lounge".to_string()))
        );
        assert!(matches!(
            manager.request_open(None, Actor::Manual).await,
            Err(OpenError::Unavailable(_))
        ));
        assert!(matches!(
            manager.apply_occupancy(true).await,
            Err(OccupancyError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_recovery_resume() {
        let store = Arc::new(FlakyStore::default());
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap();
        let leftover = store
            .insert(NewSession {
                scope: "lounge".into(),
                title: None,
                start_time: start,
                opened_by: Actor::Automatic,
            })
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::new(start + Duration::seconds(30)));
        let gateway = Arc::new(FakeGateway::default());
        let manager =
            SessionManager::start(scope(), deps(store.clone(), gateway.clone(), clock)).await;

        assert_eq!(manager.current().map(|h| h.id), Some(leftover.id));
        // Automatic session: rejoin the monitored channel
        assert_eq!(gateway.calls(), vec!["connect 20"]);
        let summary = manager.request_close(Actor::Automatic).await.unwrap();
        assert_eq!(summary.elapsed_ms, 30_000);
    }

    #[tokio::test]
    async fn test_recovery_close() {
        let store = Arc::new(MemoryStore::new());
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap();
        store
            .insert(NewSession {
                scope: "lounge".into(),
                title: None,
                start_time: start,
                opened_by: Actor::Manual,
            })
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::new(start + Duration::seconds(90)));
        let manager = SessionManager::start(
            scope(),
            ManagerDeps {
                recovery: Recovery::Close,
                ..deps(store.clone(), Arc::new(FakeGateway::default()), clock)
            },
        )
        .await;

        assert!(!manager.is_open());
        let rows = store.recent("lounge", 10).await.unwrap();
        assert_eq!(rows[0].elapsed_ms, Some(90_000));
    }

    #[tokio::test]
    async fn test_recovery_resume_manual_stays_disconnected() {
        let store = Arc::new(MemoryStore::new());
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap();
        store
            .insert(NewSession {
                scope: "lounge".into(),
                title: Some("study".into()),
                start_time: start,
                opened_by: Actor::Manual,
            })
            .await
            .unwrap();

        let gateway = Arc::new(FakeGateway::default());
        let manager = SessionManager::start(
            scope(),
            deps(store, gateway.clone(), Arc::new(ManualClock::new(start))),
        )
        .await;

        assert!(manager.is_open());
        assert!(gateway.calls().is_empty());
    }
}
