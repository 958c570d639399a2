//! Top-level error type.
//!
//! Every subsystem (RDB loading, replication, migration) defines its own
//! error enum close to where the failure actually happens, then converts
//! into `AppError` at the module boundary the CLI commands call through.
//! This mirrors the teacher's `ReplicationError`: one variant per failure
//! kind, each carrying enough context to print a single useful line.

use std::io;

use crate::migration::MigrationError;
use crate::rdb::RdbError;
use crate::replication::ReplicationError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("corruption: {0}")]
    Corruption(#[from] RdbError),

    #[error("transport: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("protocol: {message} (context: {context})")]
    Protocol { message: String, context: String },

    #[error("local I/O: {0}")]
    Io(#[from] io::Error),

    #[error("semantic: {0}")]
    Semantic(String),

    #[error("migration: {0}")]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ReplicationError> for AppError {
    fn from(e: ReplicationError) -> Self {
        match e {
            ReplicationError::Transport { message, source } => {
                AppError::Transport { message, source }
            }
            ReplicationError::Protocol { message, context } => {
                AppError::Protocol { message, context }
            }
            ReplicationError::Io(source) => AppError::Io(source),
        }
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn transport(message: impl Into<String>, source: io::Error) -> Self {
        AppError::Transport {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn protocol(message: impl Into<String>, context: impl Into<String>) -> Self {
        AppError::Protocol {
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        AppError::Semantic(message.into())
    }
}
