//! TCP dial plus the `[auth@]host:port` endpoint shape used by `--master`
//! and `--target`, and the `AUTH` handshake both the replication client and
//! the migration engine run right after connecting.

use std::io;

use tokio::io::AsyncBufRead;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::net::resp::{self, Reply};

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub addr: String,
    pub auth: Option<String>,
}

impl Endpoint {
    /// Parse `[auth@]host:port`. The auth segment, if present, is taken
    /// verbatim up to the last `@` so a password containing `@` still works.
    pub fn parse(spec: &str) -> Self {
        match spec.rsplit_once('@') {
            Some((auth, addr)) => Endpoint {
                addr: addr.to_string(),
                auth: Some(auth.to_string()),
            },
            None => Endpoint {
                addr: spec.to_string(),
                auth: None,
            },
        }
    }
}

pub async fn dial(addr: &str) -> io::Result<TcpStream> {
    TcpStream::connect(addr).await
}

/// Send `AUTH <password>` and require a `+OK` reply. A no-op when `auth` is
/// `None` — most of our traffic is against hosts with no password set.
pub async fn authenticate<R, W>(reader: &mut R, writer: &mut W, auth: Option<&str>) -> io::Result<()>
where
    R: AsyncBufRead + Unpin + Send,
    W: tokio::io::AsyncWrite + Unpin,
{
    let Some(password) = auth else {
        return Ok(());
    };
    resp::write_command(writer, [b"AUTH".as_slice(), password.as_bytes()]).await?;
    tokio::io::AsyncWriteExt::flush(writer).await?;
    let reply = resp::read_reply(reader).await?;
    match reply {
        Reply::Simple(_) => Ok(()),
        Reply::Error(e) => Err(io::Error::new(io::ErrorKind::PermissionDenied, format!("AUTH failed: {e}"))),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected AUTH reply: {other:?}"),
        )),
    }
}

/// Spawn a task that reads and discards replies from a target connection
/// until it closes or a read fails. A forwarder that only ever writes to
/// the target would otherwise stall once the target's reply buffer fills
/// and it stops reading off the socket — head-of-line blocking on the write
/// side. Mirrors `migration::engine`'s interleaved `drain_replies`, just
/// with nothing downstream caring about the reply values.
pub fn spawn_reply_drain<R>(mut reader: R) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match resp::read_reply(&mut reader).await {
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "reply drain: target connection closed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_endpoint_without_auth() {
        let e = Endpoint::parse("127.0.0.1:6379");
        assert_eq!(e.addr, "127.0.0.1:6379");
        assert!(e.auth.is_none());
    }

    #[test]
    fn parses_endpoint_with_auth() {
        let e = Endpoint::parse("s3cr3t@127.0.0.1:6379");
        assert_eq!(e.addr, "127.0.0.1:6379");
        assert_eq!(e.auth.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn auth_containing_at_sign_uses_last_separator() {
        let e = Endpoint::parse("a@b@127.0.0.1:6379");
        assert_eq!(e.addr, "127.0.0.1:6379");
        assert_eq!(e.auth.as_deref(), Some("a@b"));
    }
}
