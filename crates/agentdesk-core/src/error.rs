//! AgentDesk error types.

use thiserror::Error;

/// Errors raised by the storage, auth and server layers.
#[derive(Debug, Error)]
pub enum DeskError {
    /// SQLite failure (open, migrate, query, write).
    #[error("Database error: {0}")]
    Database(String),

    #[error("Config error: {0}")]
    Config(String),

    /// Listener bind or serve failure.
    #[error("Server error: {0}")]
    Server(String),

    /// Token could not be issued or validated.
    #[error("Auth error: {0}")]
    Auth(String),

    /// Unique constraint hit (e.g. agent email already registered).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DeskError {
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }
}

/// Result alias used across AgentDesk crates.
pub type Result<T> = std::result::Result<T, DeskError>;
