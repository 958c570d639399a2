//! `sync`: the long-running command. Opens a full resync against `--master`,
//! loads the snapshot into `--target` through the migration engine, then
//! forwards the live backlog to `--target` forever (or until the operator
//! kills the process). Reconnects to the master are handled transparently by
//! the replication client; this driver just keeps draining whatever it
//! produces.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::BufReader;
use tracing::info;

use crate::cli::SyncArgs;
use crate::config;
use crate::errors::{AppError, AppResult};
use crate::migration::{AofEofPolicy, BacklogForwarder, MigrationEngine, MigrationStats};
use crate::net::connection::{self, Endpoint};
use crate::progress::{self, ProgressCounters};
use crate::rdb::{self, LoadMessage};
use crate::replication::{ReplicationClient, SpillPipe};

const MEMORY_SPILL_CAPACITY: usize = 64 * 1024 * 1024;

pub async fn run(args: SyncArgs) -> AppResult<()> {
    let parallel = config::resolve_parallel(args.common.ncpu);
    let db_filter = config::parse_db_filter(args.common.db);
    let master = Endpoint::parse(&args.master);
    let target = Endpoint::parse(&args.target);

    let pipe = match &args.tmpfile {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            file.set_len(args.tmpfile_size)?;
            SpillPipe::new_file(file, args.tmpfile_size as usize)
        }
        None => SpillPipe::new_memory(MEMORY_SPILL_CAPACITY),
    };
    let (spill_writer, spill_reader) = pipe.split();

    let client = ReplicationClient::new(master);
    let handle = client.start(spill_writer).await?;
    info!(runid = %handle.runid, rdb_size = handle.rdb_size, "sync: full resync established");

    let counters = Arc::new(ProgressCounters::default());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let progress_task = tokio::spawn(progress::run_ticker(counters.clone(), None, "sync", shutdown_rx));

    let rt_handle = tokio::runtime::Handle::current();
    let rdb_size = handle.rdb_size as u64;
    let counters_for_loader = counters.clone();
    let (tx, rx) = tokio::sync::mpsc::channel::<LoadMessage>(parallel * 32);
    let loader_task = tokio::task::spawn_blocking(move || -> crate::replication::SpillReader {
        let blocking = spill_reader.into_blocking(rt_handle);
        let counted = progress::CountingReader::new(blocking, counters_for_loader);
        let mut limited = std::io::Read::take(counted, rdb_size);
        rdb::Loader::run(&mut limited, &tx);
        limited.into_inner().into_inner().into_inner()
    });

    let stats = Arc::new(MigrationStats::default());
    let engine = MigrationEngine::new(
        target.clone(),
        parallel,
        db_filter.clone(),
        0,
        args.use_restore_command,
        rdb::opcodes::MAX_SUPPORTED_VERSION as u16,
    );
    engine.run(rx, stats.clone()).await?;

    let spill_reader = loader_task
        .await
        .map_err(|e| AppError::semantic(format!("loader task panicked: {e}")))?;
    info!(bytes = counters.bytes_read.load(Ordering::Relaxed), "sync: snapshot loaded into target");

    let target_stream = connection::dial(&target.addr)
        .await
        .map_err(|e| AppError::transport(format!("dial target {} failed", target.addr), e))?;
    let (rd, mut writer) = target_stream.into_split();
    let mut reader = BufReader::new(rd);
    connection::authenticate(&mut reader, &mut writer, target.auth.as_deref())
        .await
        .map_err(|e| AppError::transport("target AUTH failed", e))?;
    let drain_handle = connection::spawn_reply_drain(reader);

    let backlog = BufReader::new(spill_reader.into_async_read());
    let forwarder = BacklogForwarder::new(db_filter, AofEofPolicy::TreatAsFatal);

    let forward_result = if let Some(aof_path) = &args.aof {
        let aof_file = tokio::fs::File::create(aof_path).await?;
        let mut tee = TeeWriter {
            writer,
            tee: aof_file,
        };
        let mut backlog = backlog;
        forwarder.forward(&mut backlog, &mut tee, stats.clone()).await
    } else {
        let mut backlog = backlog;
        forwarder.forward(&mut backlog, &mut writer, stats.clone()).await
    };
    drain_handle.abort();
    forward_result?;

    let _ = shutdown_tx.send(true);
    let _ = progress_task.await;

    info!(
        forwarded = stats.forwarded.load(Ordering::Relaxed),
        skipped = stats.skipped.load(Ordering::Relaxed),
        "sync: backlog stream ended"
    );
    Ok(())
}

/// Writes every backlog frame to the target and, as a side effect, to the
/// `--aof` capture file, so a running `sync` doubles as a `dump --aof`.
struct TeeWriter<W, T> {
    writer: W,
    tee: T,
}

impl<W, T> tokio::io::AsyncWrite for TeeWriter<W, T>
where
    W: tokio::io::AsyncWrite + Unpin,
    T: tokio::io::AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let n = match std::pin::Pin::new(&mut self.writer).poll_write(cx, buf) {
            std::task::Poll::Ready(Ok(n)) => n,
            other => return other,
        };
        let _ = std::pin::Pin::new(&mut self.tee).poll_write(cx, &buf[..n]);
        std::task::Poll::Ready(Ok(n))
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let r = std::pin::Pin::new(&mut self.writer).poll_flush(cx);
        let _ = std::pin::Pin::new(&mut self.tee).poll_flush(cx);
        r
    }

    fn poll_shutdown(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.writer).poll_shutdown(cx)
    }
}
