//! The PSYNC replication client and the spill pipe it drains into.

pub mod client;
pub mod spill;

pub use client::{PsyncState, ReplicationClient, ReplicationHandle};
pub use spill::{SpillPipe, SpillReader, SpillWriter};

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("transport: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("protocol: {message} (context: {context})")]
    Protocol { message: String, context: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReplicationError {
    pub fn transport(message: impl Into<String>, source: std::io::Error) -> Self {
        ReplicationError::Transport {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn protocol(message: impl Into<String>, context: impl Into<String>) -> Self {
        ReplicationError::Protocol {
            message: message.into(),
            context: context.into(),
        }
    }
}
