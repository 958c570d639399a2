//! Turning loaded entries (and backlog commands) into writes against a
//! target server: per-entry RESP command sequences, the worker pool that
//! pipelines them, and the backlog forwarder.

pub mod commands;
pub mod engine;
pub mod forwarder;

pub use engine::{EntryFilter, MigrationEngine, MigrationStats};
pub use forwarder::{AofEofPolicy, BacklogForwarder};

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("transport: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("target rejected command: {0}")]
    CommandFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    pub fn transport(message: impl Into<String>, source: std::io::Error) -> Self {
        MigrationError::Transport {
            message: message.into(),
            source: Some(source),
        }
    }
}
