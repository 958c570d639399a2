//! The migration worker pool: each worker owns one pipelined connection to
//! the target, pulls entries off the shared load channel, builds their
//! restore commands, and flushes on a timer, when its reply backlog gets
//! too deep, or when the channel drains — whichever comes first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};

use crate::net::connection::{self, Endpoint};
use crate::net::resp::{self, Reply};
use crate::migration::commands;
use crate::migration::MigrationError;
use crate::rdb::entry::LoadMessage;


/// Accepts or rejects an entry by db index; built from `--db=N` (or
/// "accept everything" when unset).
pub type EntryFilter = Arc<dyn Fn(u64) -> bool + Send + Sync>;

#[derive(Debug, Default)]
pub struct MigrationStats {
    pub forwarded: AtomicU64,
    pub skipped: AtomicU64,
}

/// Flush once this many un-acknowledged commands are outstanding, even if
/// the 250ms tick hasn't fired yet.
const MAX_OUTSTANDING: usize = 1000;

pub struct MigrationEngine {
    target: Endpoint,
    parallel: usize,
    filter: EntryFilter,
    expire_shift_ms: i64,
    use_restore_command: bool,
    rdb_version: u16,
}

impl MigrationEngine {
    pub fn new(
        target: Endpoint,
        parallel: usize,
        filter: EntryFilter,
        expire_shift_ms: i64,
        use_restore_command: bool,
        rdb_version: u16,
    ) -> Self {
        Self {
            target,
            parallel,
            filter,
            expire_shift_ms,
            use_restore_command,
            rdb_version,
        }
    }

    pub async fn run(self, rx: mpsc::Receiver<LoadMessage>, stats: Arc<MigrationStats>) -> Result<(), MigrationError> {
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::with_capacity(self.parallel);
        for _ in 0..self.parallel {
            let worker = Worker {
                target: self.target.clone(),
                filter: self.filter.clone(),
                expire_shift_ms: self.expire_shift_ms,
                use_restore_command: self.use_restore_command,
                rdb_version: self.rdb_version,
            };
            let rx = rx.clone();
            let stats = stats.clone();
            handles.push(tokio::spawn(async move { worker.run(rx, stats).await }));
        }
        for handle in handles {
            handle
                .await
                .map_err(|e| MigrationError::CommandFailed(format!("worker task panicked: {e}")))??;
        }
        Ok(())
    }
}

struct Worker {
    target: Endpoint,
    filter: EntryFilter,
    expire_shift_ms: i64,
    use_restore_command: bool,
    rdb_version: u16,
}

impl Worker {
    async fn run(self, rx: Arc<Mutex<mpsc::Receiver<LoadMessage>>>, stats: Arc<MigrationStats>) -> Result<(), MigrationError> {
        let stream = connection::dial(&self.target.addr)
            .await
            .map_err(|e| MigrationError::transport(format!("dial target {} failed", self.target.addr), e))?;
        let (rd, mut writer) = stream.into_split();
        let mut reader = BufReader::new(rd);
        connection::authenticate(&mut reader, &mut writer, self.target.auth.as_deref())
            .await
            .map_err(|e| MigrationError::transport("target AUTH failed", e))?;

        let mut last_db: Option<u64> = None;
        let mut outstanding: usize = 0;
        let mut tick = tokio::time::interval(Duration::from_millis(250));

        loop {
            tokio::select! {
                msg = async { rx.lock().await.recv().await } => {
                    match msg {
                        None => break,
                        Some(LoadMessage::Error(e)) => {
                            return Err(MigrationError::CommandFailed(format!("rdb load failed: {e}")));
                        }
                        Some(LoadMessage::Entry(entry)) => {
                            if !(self.filter)(entry.db) {
                                stats.skipped.fetch_add(1, Ordering::Relaxed);
                                continue;
                            }
                            let now_ms = chrono::Utc::now().timestamp_millis();
                            let mut cmds: Vec<Vec<Bytes>> = Vec::new();
                            if last_db != Some(entry.db) {
                                cmds.push(vec![Bytes::from_static(b"SELECT"), Bytes::from(entry.db.to_string())]);
                                last_db = Some(entry.db);
                            }
                            if self.use_restore_command
                                && commands::approximate_value_size(&entry.value) < commands::RESTORE_OPTIMIZATION_THRESHOLD
                            {
                                cmds.extend(commands::build_restore_via_dump(&entry, self.rdb_version, self.expire_shift_ms, now_ms));
                            } else {
                                cmds.extend(commands::build_restore_commands(&entry, self.expire_shift_ms, now_ms));
                            }
                            for cmd in &cmds {
                                let refs: Vec<&[u8]> = cmd.iter().map(|b| b.as_ref()).collect();
                                resp::write_command(&mut writer, refs)
                                    .await
                                    .map_err(|e| MigrationError::transport("writing restore command failed", e))?;
                                outstanding += 1;
                            }
                            stats.forwarded.fetch_add(1, Ordering::Relaxed);
                            if outstanding >= MAX_OUTSTANDING {
                                writer.flush().await.map_err(|e| MigrationError::transport("flush failed", e))?;
                                drain_replies(&mut reader, &mut outstanding).await?;
                            }
                        }
                    }
                }
                _ = tick.tick() => {
                    if outstanding > 0 {
                        writer.flush().await.map_err(|e| MigrationError::transport("flush failed", e))?;
                        drain_replies(&mut reader, &mut outstanding).await?;
                    }
                }
            }
        }

        if outstanding > 0 {
            writer.flush().await.map_err(|e| MigrationError::transport("flush failed", e))?;
            drain_replies(&mut reader, &mut outstanding).await?;
        }
        Ok(())
    }
}

async fn drain_replies<R: AsyncBufRead + Unpin + Send>(reader: &mut R, outstanding: &mut usize) -> Result<(), MigrationError> {
    while *outstanding > 0 {
        let reply = resp::read_reply(reader)
            .await
            .map_err(|e| MigrationError::transport("reading target reply failed", e))?;
        if let Reply::Error(e) = reply {
            return Err(MigrationError::CommandFailed(e));
        }
        *outstanding -= 1;
    }
    Ok(())
}
