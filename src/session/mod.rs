//! Presence sessions
//!
//! A session is an interval during which a monitored voice channel is occupied.
//! It is Open while `elapsed_ms` is unset and Closed once it has been set;
//! closing happens exactly once.

pub mod clock;
pub mod format;
pub mod manager;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub use clock::{Clock, SystemClock};
pub use manager::{ManagerDeps, OccupancyChange, SessionManager};

/// Who asked for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    /// A user command
    Manual,
    /// A membership-change notification
    Automatic,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::Manual => "manual",
            Actor::Automatic => "automatic",
        }
    }

    pub fn parse(s: &str) -> Option<Actor> {
        match s {
            "manual" => Some(Actor::Manual),
            "automatic" => Some(Actor::Automatic),
            _ => None,
        }
    }
}

/// A stored session row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub scope: String,
    pub title: Option<String>,
    pub start_time: DateTime<Utc>,
    /// None while open
    pub elapsed_ms: Option<i64>,
    pub opened_by: Actor,
    pub closed_by: Option<Actor>,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.elapsed_ms.is_none()
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed_ms.map(Duration::milliseconds)
    }
}

/// Fields for a session about to be inserted
#[derive(Debug, Clone)]
pub struct NewSession {
    pub scope: String,
    pub title: Option<String>,
    pub start_time: DateTime<Utc>,
    pub opened_by: Actor,
}

/// The scope's current open session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionHandle {
    pub id: String,
    pub title: Option<String>,
    pub start_time: DateTime<Utc>,
    pub opened_by: Actor,
}

impl From<&Session> for SessionHandle {
    fn from(session: &Session) -> Self {
        SessionHandle {
            id: session.id.clone(),
            title: session.title.clone(),
            start_time: session.start_time,
            opened_by: session.opened_by,
        }
    }
}

/// Result of closing a session, for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedSummary {
    pub id: String,
    pub title: Option<String>,
    pub start_time: DateTime<Utc>,
    pub elapsed_ms: i64,
}

impl ClosedSummary {
    pub fn elapsed(&self) -> Duration {
        Duration::milliseconds(self.elapsed_ms)
    }
}
