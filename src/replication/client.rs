//! The PSYNC client: opens a full resync against a master, feeds the RDB
//! prefix and then the live backlog into a spill pipe, sends `REPLCONF ACK`
//! once a second, and reconnects with `PSYNC <runid> <offset+1>` on any
//! transport error — forever, since a sync run is meant to keep going until
//! the operator kills it.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::net::connection::{self, Endpoint};
use crate::net::resp::{self, Reply};
use crate::replication::spill::SpillWriter;
use crate::replication::ReplicationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsyncState {
    Connecting,
    Authenticating,
    RequestingFullresync,
    AwaitingRdbSize,
    TransferringRdb,
    StreamingBacklog,
    Reconnecting,
}

/// Log a handshake/streaming state transition at the verbosity that state
/// deserves: the one-time handshake steps are `debug`, the steady-state
/// streaming is `info`, and a dropped link is `warn`.
fn log_transition(state: PsyncState) {
    match state {
        PsyncState::Connecting => debug!("psync: connecting"),
        PsyncState::Authenticating => debug!("psync: authenticating"),
        PsyncState::RequestingFullresync => debug!("psync: requesting full resync"),
        PsyncState::AwaitingRdbSize => debug!("psync: awaiting rdb size"),
        PsyncState::TransferringRdb => info!("psync: transferring rdb snapshot"),
        PsyncState::StreamingBacklog => info!("psync: streaming backlog"),
        PsyncState::Reconnecting => warn!("psync: reconnecting"),
    }
}

/// What `ReplicationClient::start` hands back once the handshake is done
/// and the rdb size is known: the background task is already running,
/// feeding `spill` on its own.
pub struct ReplicationHandle {
    pub runid: String,
    pub rdb_size: i64,
    pub dump_offset: Arc<AtomicI64>,
    pub ack_offset: Arc<AtomicI64>,
    pub task: JoinHandle<Result<(), ReplicationError>>,
}

#[derive(Clone)]
pub struct ReplicationClient {
    endpoint: Endpoint,
}

impl ReplicationClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    /// Run the handshake (`Connecting` through `AwaitingRdbSize`) on the
    /// caller's task, then spawn a background task to drive the RDB
    /// transfer, backlog streaming, ACK ticker, and reconnect loop.
    pub async fn start(self, spill: SpillWriter) -> Result<ReplicationHandle, ReplicationError> {
        let (mut reader, mut writer, runid, offset) = self.handshake().await?;

        log_transition(PsyncState::AwaitingRdbSize);
        let rdb_size = await_rdb_size(&mut reader).await?;
        debug!(rdb_size, "psync: rdb size announced");

        let dump_offset = Arc::new(AtomicI64::new(0));
        let ack_offset = Arc::new(AtomicI64::new(offset));
        let endpoint = self.endpoint.clone();
        let runid_owned = runid.clone();
        let do_ = dump_offset.clone();
        let ao = ack_offset.clone();

        let task = tokio::spawn(async move {
            Self::drive(endpoint, reader, writer, runid_owned, rdb_size, spill, do_, ao).await
        });

        Ok(ReplicationHandle {
            runid,
            rdb_size,
            dump_offset,
            ack_offset,
            task,
        })
    }

    async fn handshake(
        &self,
    ) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf, String, i64), ReplicationError> {
        log_transition(PsyncState::Connecting);
        let stream = connection::dial(&self.endpoint.addr)
            .await
            .map_err(|e| ReplicationError::transport(format!("dial {} failed", self.endpoint.addr), e))?;
        let (rd, mut writer) = stream.into_split();
        let mut reader = BufReader::new(rd);

        log_transition(PsyncState::Authenticating);
        connection::authenticate(&mut reader, &mut writer, self.endpoint.auth.as_deref())
            .await
            .map_err(|e| ReplicationError::transport("AUTH failed", e))?;

        resp::write_command(&mut writer, [b"PING".as_slice()])
            .await
            .map_err(|e| ReplicationError::transport("PING failed", e))?;
        writer.flush().await.map_err(|e| ReplicationError::transport("flush failed", e))?;
        resp::read_reply(&mut reader)
            .await
            .map_err(|e| ReplicationError::transport("PING reply failed", e))?;

        resp::write_command(&mut writer, [b"REPLCONF".as_slice(), b"listening-port", b"0"])
            .await
            .map_err(|e| ReplicationError::transport("REPLCONF listening-port failed", e))?;
        writer.flush().await.map_err(|e| ReplicationError::transport("flush failed", e))?;
        resp::read_reply(&mut reader)
            .await
            .map_err(|e| ReplicationError::transport("REPLCONF listening-port reply failed", e))?;

        resp::write_command(&mut writer, [b"REPLCONF".as_slice(), b"capa", b"psync2"])
            .await
            .map_err(|e| ReplicationError::transport("REPLCONF capa failed", e))?;
        writer.flush().await.map_err(|e| ReplicationError::transport("flush failed", e))?;
        resp::read_reply(&mut reader)
            .await
            .map_err(|e| ReplicationError::transport("REPLCONF capa reply failed", e))?;

        log_transition(PsyncState::RequestingFullresync);
        resp::write_command(&mut writer, [b"PSYNC".as_slice(), b"?", b"-1"])
            .await
            .map_err(|e| ReplicationError::transport("PSYNC failed", e))?;
        writer.flush().await.map_err(|e| ReplicationError::transport("flush failed", e))?;

        let reply = resp::read_reply(&mut reader)
            .await
            .map_err(|e| ReplicationError::transport("PSYNC reply failed", e))?;
        let line = match reply {
            Reply::Simple(s) => s,
            other => return Err(ReplicationError::protocol("unexpected PSYNC reply", format!("{other:?}"))),
        };
        let mut parts = line.split_whitespace();
        let verb = parts.next().unwrap_or_default();
        if !verb.eq_ignore_ascii_case("FULLRESYNC") {
            return Err(ReplicationError::protocol("expected FULLRESYNC", line));
        }
        let runid = parts
            .next()
            .ok_or_else(|| ReplicationError::protocol("FULLRESYNC missing runid", line.clone()))?
            .to_string();
        let offset: i64 = parts
            .next()
            .ok_or_else(|| ReplicationError::protocol("FULLRESYNC missing offset", line.clone()))?
            .parse()
            .map_err(|_| ReplicationError::protocol("FULLRESYNC bad offset", line.clone()))?;

        info!(runid, offset, "psync: full resync granted");
        Ok((reader, writer, runid, offset))
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        endpoint: Endpoint,
        mut reader: BufReader<OwnedReadHalf>,
        mut writer: OwnedWriteHalf,
        runid: String,
        rdb_size: i64,
        spill: SpillWriter,
        dump_offset: Arc<AtomicI64>,
        ack_offset: Arc<AtomicI64>,
    ) -> Result<(), ReplicationError> {
        log_transition(PsyncState::TransferringRdb);
        copy_exact(&mut reader, &spill, rdb_size as u64, &dump_offset).await?;
        info!(bytes = rdb_size, "replication: rdb snapshot transferred");

        loop {
            log_transition(PsyncState::StreamingBacklog);
            let result = stream_backlog(&mut reader, &mut writer, &spill, &ack_offset).await;
            if let Err(e) = result {
                warn!(error = %e, "replication: connection lost, reconnecting");
            } else {
                return Ok(());
            }

            log_transition(PsyncState::Reconnecting);
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let resume_from = ack_offset.load(Ordering::SeqCst) + 1;
                match reconnect(&endpoint, &runid, resume_from).await {
                    Ok((r, w)) => {
                        info!(resume_from, "replication: reconnected");
                        reader = r;
                        writer = w;
                        break;
                    }
                    Err(e) => warn!(error = %e, "replication: reconnect failed, retrying"),
                }
            }
        }
    }
}

async fn await_rdb_size<R: AsyncBufRead + Unpin>(r: &mut R) -> Result<i64, ReplicationError> {
    loop {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)
            .await
            .map_err(|e| ReplicationError::transport("reading rdb size line", e))?;
        if byte[0] == b'\n' {
            debug!("psync: heartbeat while awaiting rdb size");
            continue;
        }
        if byte[0] != b'$' {
            return Err(ReplicationError::protocol(
                "expected $<size> line",
                format!("got byte 0x{:02x}", byte[0]),
            ));
        }
        let mut rest = String::new();
        tokio::io::AsyncBufReadExt::read_line(r, &mut rest)
            .await
            .map_err(|e| ReplicationError::transport("reading rdb size line", e))?;
        let n: i64 = rest
            .trim_end()
            .parse()
            .map_err(|_| ReplicationError::protocol("bad rdb size", rest.clone()))?;
        return Ok(n);
    }
}

async fn copy_exact<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
    spill: &SpillWriter,
    mut remaining: u64,
    counter: &Arc<AtomicI64>,
) -> Result<(), ReplicationError> {
    let mut buf = vec![0u8; 64 * 1024];
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        reader
            .read_exact(&mut buf[..chunk])
            .await
            .map_err(|e| ReplicationError::transport("reading rdb bytes", e))?;
        spill
            .write_all(&buf[..chunk])
            .await
            .map_err(ReplicationError::Io)?;
        counter.fetch_add(chunk as i64, Ordering::SeqCst);
        remaining -= chunk as u64;
    }
    Ok(())
}

async fn stream_backlog(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    spill: &SpillWriter,
    ack_offset: &Arc<AtomicI64>,
) -> Result<(), ReplicationError> {
    let copy_fut = async {
        let mut buf = [0u8; 16 * 1024];
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| ReplicationError::transport("backlog read failed", e))?;
            if n == 0 {
                return Err(ReplicationError::Transport {
                    message: "master closed backlog stream".into(),
                    source: None,
                });
            }
            spill.write_all(&buf[..n]).await.map_err(ReplicationError::Io)?;
            ack_offset.fetch_add(n as i64, Ordering::SeqCst);
        }
    };
    let ack_fut = async {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let offset = ack_offset.load(Ordering::SeqCst);
            resp::write_command(writer, [b"REPLCONF".as_slice(), b"ACK", offset.to_string().as_bytes()])
                .await
                .map_err(|e| ReplicationError::transport("REPLCONF ACK failed", e))?;
            writer.flush().await.map_err(|e| ReplicationError::transport("flush ACK failed", e))?;
        }
    };
    tokio::select! {
        r = copy_fut => r,
        r = ack_fut => r,
    }
}

async fn reconnect(
    endpoint: &Endpoint,
    runid: &str,
    resume_from: i64,
) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf), ReplicationError> {
    let stream = connection::dial(&endpoint.addr)
        .await
        .map_err(|e| ReplicationError::transport("dial failed", e))?;
    let (rd, mut writer) = stream.into_split();
    let mut reader = BufReader::new(rd);
    connection::authenticate(&mut reader, &mut writer, endpoint.auth.as_deref())
        .await
        .map_err(|e| ReplicationError::transport("AUTH failed", e))?;

    resp::write_command(
        &mut writer,
        [b"PSYNC".as_slice(), runid.as_bytes(), resume_from.to_string().as_bytes()],
    )
    .await
    .map_err(|e| ReplicationError::transport("PSYNC resume failed", e))?;
    writer.flush().await.map_err(|e| ReplicationError::transport("flush failed", e))?;

    let reply = resp::read_reply(&mut reader)
        .await
        .map_err(|e| ReplicationError::transport("PSYNC resume reply failed", e))?;
    match reply {
        Reply::Simple(s) if s.eq_ignore_ascii_case("CONTINUE") => Ok((reader, writer)),
        other => Err(ReplicationError::protocol("expected CONTINUE", format!("{other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn await_rdb_size_skips_heartbeats() {
        let mut r = BufReader::new(Cursor::new(b"\n\n$1024\r\n".to_vec()));
        assert_eq!(await_rdb_size(&mut r).await.unwrap(), 1024);
    }

    #[tokio::test]
    async fn await_rdb_size_rejects_bad_prefix() {
        let mut r = BufReader::new(Cursor::new(b"+oops\r\n".to_vec()));
        assert!(await_rdb_size(&mut r).await.is_err());
    }
}
