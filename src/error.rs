//! Error types for Voxlog

use crate::session::ClosedSummary;
use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// API error
    #[error("API error: {0}")]
    Api(String),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type alias for Core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Failure of a session store call
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The blocking database task could not complete
    #[error("database task failed: {0}")]
    Task(String),

    /// Row did not exist or was already closed
    #[error("session {0} is not open")]
    NotOpen(String),

    #[error("corrupt session row: {0}")]
    Corrupt(String),
}

/// Failure of a gateway connect/disconnect call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Nobody is listening for connection requests
    #[error("no relay is subscribed to gateway requests")]
    NoRelay,

    #[error("gateway request failed: {0}")]
    Request(String),

    /// The scope's manager has stopped
    #[error("scope {0} is not running")]
    Unavailable(String),
}

/// Why a session could not be opened
#[derive(Error, Debug)]
pub enum OpenError {
    /// A session is already open for this scope (manual requests only)
    #[error("a session is already open")]
    AlreadyOpen,

    /// The insert did not land; the scope stays closed
    #[error("failed to record session start: {0}")]
    Store(#[source] StoreError),

    /// The scope's manager has stopped
    #[error("scope {0} is not running")]
    Unavailable(String),
}

/// Why a session could not be closed
#[derive(Error, Debug)]
pub enum CloseError {
    #[error("no session is open")]
    NothingOpen,

    /// The session is closed in memory but the row update did not land
    #[error("session closed but not persisted: {source}")]
    NotPersisted {
        summary: ClosedSummary,
        #[source]
        source: StoreError,
    },

    /// The scope's manager has stopped
    #[error("scope {0} is not running")]
    Unavailable(String),
}

/// Why an occupancy change could not be applied
#[derive(Error, Debug)]
pub enum OccupancyError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Close(#[from] CloseError),

    /// The scope's manager has stopped
    #[error("scope {0} is not running")]
    Unavailable(String),
}
