//! SQLite-backed session store

use super::{new_session_id, SessionStore};
use crate::db::Database;
use crate::error::StoreError;
use crate::session::{Actor, NewSession, Session};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};

const SESSION_COLUMNS: &str = "id, scope, title, start_time, elapsed_ms, opened_by, closed_by";

pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        SqliteStore { db }
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering
fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<std::result::Result<Session, StoreError>> {
    let id: String = row.get(0)?;
    let scope: String = row.get(1)?;
    let title: Option<String> = row.get(2)?;
    let start_time: String = row.get(3)?;
    let elapsed_ms: Option<i64> = row.get(4)?;
    let opened_by: String = row.get(5)?;
    let closed_by: Option<String> = row.get(6)?;

    Ok(build_session(
        id, scope, title, &start_time, elapsed_ms, &opened_by, closed_by,
    ))
}

fn build_session(
    id: String,
    scope: String,
    title: Option<String>,
    start_time: &str,
    elapsed_ms: Option<i64>,
    opened_by: &str,
    closed_by: Option<String>,
) -> std::result::Result<Session, StoreError> {
    let start_time = DateTime::parse_from_rfc3339(start_time)
        .map_err(|e| StoreError::Corrupt(format!("session {id}: start_time: {e}")))?
        .with_timezone(&Utc);
    let opened_by = Actor::parse(opened_by)
        .ok_or_else(|| StoreError::Corrupt(format!("session {id}: opened_by: {opened_by}")))?;
    let closed_by = match closed_by {
        Some(s) => Some(
            Actor::parse(&s)
                .ok_or_else(|| StoreError::Corrupt(format!("session {id}: closed_by: {s}")))?,
        ),
        None => None,
    };

    Ok(Session {
        id,
        scope,
        title,
        start_time,
        elapsed_ms,
        opened_by,
        closed_by,
    })
}

#[async_trait]
impl SessionStore for SqliteStore {
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
        let row = session.clone();

        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO sessions (id, scope, title, start_time, opened_by, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        row.id,
                        row.scope,
                        row.title,
                        timestamp(row.start_time),
                        row.opened_by.as_str(),
                        timestamp(Utc::now()),
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(session)
    }

    async fn close(
        &self,
        id: &str,
        elapsed: Duration,
        closed_by: Actor,
        closed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let id = id.to_string();
        let elapsed_ms = elapsed.num_milliseconds().max(0);

        self.db
            .with_conn(move |conn| {
                let updated = conn.execute(
                    "UPDATE sessions SET elapsed_ms = ?2, closed_by = ?3, closed_at = ?4
                     WHERE id = ?1 AND elapsed_ms IS NULL",
                    params![id, elapsed_ms, closed_by.as_str(), timestamp(closed_at)],
                )?;
                if updated == 0 {
                    return Err(StoreError::NotOpen(id));
                }
                Ok(())
            })
            .await
    }

    async fn latest_open(&self, scope: &str) -> Result<Option<Session>, StoreError> {
        let scope = scope.to_string();

        self.db
            .with_conn(move |conn| {
                let sql = format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE scope = ?1 AND elapsed_ms IS NULL
                     ORDER BY start_time DESC, rowid DESC LIMIT 1"
                );
                let row = conn
                    .query_row(&sql, params![scope], map_row)
                    .optional()?;
                row.transpose()
            })
            .await
    }

    async fn recent(&self, scope: &str, limit: usize) -> Result<Vec<Session>, StoreError> {
        let scope = scope.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.db
            .with_conn(move |conn| {
                let sql = format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE scope = ?1
                     ORDER BY start_time DESC, rowid DESC LIMIT ?2"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![scope, limit], map_row)?;

                let mut sessions = Vec::new();
                for row in rows {
                    sessions.push(row??);
                }
                Ok(sessions)
            })
            .await
    }
}
