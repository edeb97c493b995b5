//! SessionStore - storage backend for session rows.
//!
//! - `SqliteStore` - SQLite database (storage = "db")
//! - `MemoryStore` - in-memory rows (storage = "ephemeral")

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::session::{Actor, NewSession, Session};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Durable session rows, keyed by an id the store assigns
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new open session and return it with its assigned id
    async fn insert(&self, new: NewSession) -> Result<Session, StoreError>;

    /// Record the elapsed time of an open session.
    ///
    /// Fails with [`StoreError::NotOpen`] if the row is missing or already
    /// closed; a closed row is never rewritten.
    async fn close(
        &self,
        id: &str,
        elapsed: Duration,
        closed_by: Actor,
        closed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Most recently started open session for a scope
    async fn latest_open(&self, scope: &str) -> Result<Option<Session>, StoreError>;

    /// Up to `limit` sessions for a scope, most recent first
    async fn recent(&self, scope: &str, limit: usize) -> Result<Vec<Session>, StoreError>;
}

/// Generate an opaque session id
fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
