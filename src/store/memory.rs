//! In-memory session store (storage = "ephemeral")

use super::{new_session_id, SessionStore};
use crate::error::StoreError;
use crate::session::{Actor, NewSession, Session};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

/// Rows kept in insertion order; lost when the process exits
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<Vec<Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, new: NewSession) -> Result<Session, StoreError> {
        let session = Session {
            id: new_session_id(),
            scope: new.scope,
            title: new.title,
            start_time: new.start_time,
            elapsed_ms: None,
            opened_by: new.opened_by,
            closed_by: None,
        };
        self.sessions.write().await.push(session.clone());
        Ok(session)
    }

    async fn close(
        &self,
        id: &str,
        elapsed: Duration,
        closed_by: Actor,
        _closed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.iter_mut().find(|s| s.id == id && s.is_open()) {
            Some(session) => {
                session.elapsed_ms = Some(elapsed.num_milliseconds().max(0));
                session.closed_by = Some(closed_by);
                Ok(())
            }
            None => Err(StoreError::NotOpen(id.to_string())),
        }
    }

    async fn latest_open(&self, scope: &str) -> Result<Option<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .iter()
            .filter(|s| s.scope == scope && s.is_open())
            .max_by_key(|s| s.start_time)
            .cloned())
    }

    async fn recent(&self, scope: &str, limit: usize) -> Result<Vec<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut rows: Vec<Session> = sessions
            .iter()
            .rev()
            .filter(|s| s.scope == scope)
            .cloned()
            .collect();
        // Stable sort keeps later inserts first among equal start times
        rows.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        rows.truncate(limit);
        Ok(rows)
    }
}
