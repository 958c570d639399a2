//! The AOF/backlog forwarder: reads RESP command frames from a backlog
//! source (a captured `--aof` file, or the tail of the spill pipe once the
//! RDB prefix has been consumed) and writes them to the target verbatim,
//! tracking the current db via `SELECT` so the `--db` filter still applies
//! to everything that follows it.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};

use crate::migration::engine::{EntryFilter, MigrationStats};
use crate::migration::MigrationError;
use crate::net::resp;

/// What an EOF on the backlog source means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AofEofPolicy {
    /// A finite capture (`restore --aof`): running out of input is the
    /// expected way this stream ends.
    TreatAsStreamEnd,
    /// A live backlog (`sync`): the master closing the connection mid-stream
    /// means the link died, not that replication is "done".
    TreatAsFatal,
}

pub struct BacklogForwarder {
    filter: EntryFilter,
    eof_policy: AofEofPolicy,
}

impl BacklogForwarder {
    pub fn new(filter: EntryFilter, eof_policy: AofEofPolicy) -> Self {
        Self { filter, eof_policy }
    }

    pub async fn forward<R, W>(&self, reader: &mut R, writer: &mut W, stats: Arc<MigrationStats>) -> Result<(), MigrationError>
    where
        R: AsyncBufRead + Unpin + Send,
        W: AsyncWrite + Unpin,
    {
        let mut current_db: u64 = 0;
        loop {
            let frame = match resp::read_command_frame(reader)
                .await
                .map_err(|e| MigrationError::transport("reading backlog frame failed", e))?
            {
                Some(f) => f,
                None => {
                    return match self.eof_policy {
                        AofEofPolicy::TreatAsStreamEnd => Ok(()),
                        AofEofPolicy::TreatAsFatal => Err(MigrationError::Transport {
                            message: "backlog stream ended unexpectedly".into(),
                            source: None,
                        }),
                    };
                }
            };

            let first_word = frame.first_word_upper();
            let forward = if first_word == b"PING" {
                true
            } else if first_word == b"SELECT" {
                if let Some(arg) = frame.args.get(1) {
                    if let Ok(s) = std::str::from_utf8(arg) {
                        if let Ok(n) = s.parse::<u64>() {
                            current_db = n;
                        }
                    }
                }
                (self.filter)(current_db)
            } else {
                (self.filter)(current_db)
            };

            if forward {
                writer
                    .write_all(&frame.raw)
                    .await
                    .map_err(|e| MigrationError::transport("forwarding backlog frame failed", e))?;
                writer.flush().await.map_err(|e| MigrationError::transport("flush failed", e))?;
                stats.forwarded.fetch_add(1, Ordering::Relaxed);
            } else {
                stats.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    fn accept_all() -> EntryFilter {
        Arc::new(|_| true)
    }

    fn accept_only(db: u64) -> EntryFilter {
        Arc::new(move |d| d == db)
    }

    #[tokio::test]
    async fn forwards_everything_when_filter_accepts_all() {
        let input = b"*1\r\n$4\r\nPING\r\n*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\nb\r\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(input.clone()));
        let mut out = Vec::new();
        let stats = Arc::new(MigrationStats::default());
        let forwarder = BacklogForwarder::new(accept_all(), AofEofPolicy::TreatAsStreamEnd);
        forwarder.forward(&mut reader, &mut out, stats.clone()).await.unwrap();
        assert_eq!(out, input);
        assert_eq!(stats.forwarded.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn select_gates_subsequent_commands() {
        let input = b"*2\r\n$6\r\nSELECT\r\n$1\r\n1\r\n*1\r\n$4\r\nPING\r\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(input));
        let mut out = Vec::new();
        let stats = Arc::new(MigrationStats::default());
        let forwarder = BacklogForwarder::new(accept_only(0), AofEofPolicy::TreatAsStreamEnd);
        forwarder.forward(&mut reader, &mut out, stats.clone()).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(stats.skipped.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn fatal_eof_policy_errors_on_clean_eof() {
        let mut reader = BufReader::new(Cursor::new(Vec::new()));
        let mut out = Vec::new();
        let stats = Arc::new(MigrationStats::default());
        let forwarder = BacklogForwarder::new(accept_all(), AofEofPolicy::TreatAsFatal);
        assert!(forwarder.forward(&mut reader, &mut out, stats).await.is_err());
    }
}
