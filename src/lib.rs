//! Voxlog - headless service tracking voice-channel presence sessions
//!
//! A session opens when a monitored voice channel becomes occupied by at least
//! one human and closes when the last one leaves, or when a user starts/ends
//! it by command. Start time and elapsed duration are stored per session.
//!
//! - Per-scope lifecycle actors keep exactly one session open at a time
//! - SQLite (or in-memory) session storage
//! - HTTP API for the relay: presence ingress, commands, SSE events
//! - Liveness endpoint for uptime checks
//!
//! # Usage
//!
//! ```text
//! voxlog --config ~/.voxlog/config.toml
//! ```

pub mod api;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod gateway;
pub mod session;
pub mod store;
pub mod watcher;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::Config;
pub use db::Database;
pub use error::{CoreError, Result};

use commands::CommandHandler;
use config::Storage;
use events::SessionEvent;
use gateway::{MembershipUpdate, RelayGateway};
use session::{ManagerDeps, SessionManager, SystemClock};
use std::sync::Arc;
use store::{MemoryStore, SessionStore, SqliteStore};
use tokio::sync::{broadcast, mpsc, RwLock};
use watcher::{PresenceWatcher, WatcherHandle};

/// Buffered membership updates awaiting the watcher
const PRESENCE_QUEUE: usize = 256;

/// Core service that wires scopes, storage, gateway and API together
pub struct Core {
    /// Configuration
    pub config: Config,

    /// One manager per monitored scope
    managers: Vec<SessionManager>,

    /// Command surface shared with the API
    commands: Arc<CommandHandler>,

    /// Broadcast channel for SSE events
    event_tx: broadcast::Sender<SessionEvent>,

    /// Feeds the presence watcher
    presence_tx: mpsc::Sender<MembershipUpdate>,

    /// Presence watcher task
    watcher_handle: RwLock<Option<WatcherHandle>>,
}

impl Core {
    /// Validate the configuration and start every scope and the watcher.
    ///
    /// Configuration problems are returned as [`CoreError::Config`] before
    /// anything is started.
    pub async fn start(config: Config) -> Result<Self> {
        config.validate()?;
        let scopes = config.monitored_scopes()?;
        let bot_user_id = config
            .gateway
            .bot_user_id
            .ok_or_else(|| CoreError::Config("gateway.bot_user_id is required".to_string()))?;

        let store = open_store(&config)?;
        let (event_tx, _) = broadcast::channel(256);
        let deps = ManagerDeps {
            store,
            gateway: Arc::new(RelayGateway::new(event_tx.clone())),
            clock: Arc::new(SystemClock),
            event_tx: event_tx.clone(),
            recovery: config.recovery,
        };

        let mut managers = Vec::with_capacity(scopes.len());
        for scope in scopes {
            managers.push(SessionManager::start(scope, deps.clone()).await);
        }

        let commands = Arc::new(CommandHandler::new(
            managers.iter().cloned(),
            config.display.utc_offset_minutes,
        ));

        let (presence_tx, presence_rx) = mpsc::channel(PRESENCE_QUEUE);
        let watcher = Arc::new(PresenceWatcher::new(bot_user_id, managers.iter().cloned()));
        let watcher_handle = watcher::start_watcher(watcher, presence_rx);

        Ok(Core {
            config,
            managers,
            commands,
            event_tx,
            presence_tx,
            watcher_handle: RwLock::new(Some(watcher_handle)),
        })
    }

    /// Start the HTTP API server (blocks until shutdown)
    pub async fn start_api_server(&self) -> Result<()> {
        let addr = self.config.server_addr();
        tracing::info!("Starting API server on {}", addr);
        api::serve(
            addr,
            api::AppState {
                api_key: self.config.server.api_key.clone(),
                commands: Arc::clone(&self.commands),
                managers: Arc::new(self.managers.clone()),
                presence_tx: self.presence_tx.clone(),
                event_tx: self.event_tx.clone(),
            },
        )
        .await
    }

    /// Stop the presence watcher
    pub async fn stop_watching(&self) -> Result<()> {
        if let Some(handle) = self.watcher_handle.write().await.take() {
            handle.stop().await?;
        }
        Ok(())
    }

    /// Scope managers, in configuration order
    pub fn managers(&self) -> &[SessionManager] {
        &self.managers
    }

    /// Sender feeding membership updates to the watcher
    pub fn presence_sender(&self) -> mpsc::Sender<MembershipUpdate> {
        self.presence_tx.clone()
    }

    /// Get the event sender for broadcasting events
    pub fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.event_tx.clone()
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn SessionStore>> {
    match config.storage {
        Storage::Db => {
            let db = Database::new(config.data_dir().join("voxlog.db"))?;
            tracing::info!("Using session database at {}", db.path().display());
            Ok(Arc::new(SqliteStore::new(db)))
        }
        Storage::Ephemeral => {
            tracing::warn!("Using ephemeral storage; sessions are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
