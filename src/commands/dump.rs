//! `dump`: open a full resync against `--master` and write the RDB
//! container straight through to `--output` (or stdout), with no parsing —
//! we don't need to understand the snapshot to copy its bytes. If `--aof`
//! is set, the backlog that follows is captured to that file too.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::cli::DumpArgs;
use crate::commands::open_output;
use crate::errors::{AppError, AppResult};
use crate::net::connection::Endpoint;
use crate::progress::ProgressCounters;
use crate::replication::{ReplicationClient, SpillPipe};

const SPILL_CAPACITY: usize = 64 * 1024 * 1024;

pub async fn run(args: DumpArgs) -> AppResult<()> {
    let endpoint = Endpoint::parse(&args.master);
    let pipe = SpillPipe::new_memory(SPILL_CAPACITY);
    let (spill_writer, spill_reader) = pipe.split();

    let client = ReplicationClient::new(endpoint);
    let handle = client.start(spill_writer).await?;
    info!(runid = %handle.runid, rdb_size = handle.rdb_size, "dump: full resync established");

    let counters = Arc::new(ProgressCounters::default());
    let mut output = open_output(args.output.as_deref()).await?;

    let mut remaining = handle.rdb_size as u64;
    let mut buf = vec![0u8; 64 * 1024];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = spill_reader.read_some(&mut buf[..want]).await?;
        if n == 0 {
            return Err(AppError::semantic("spill pipe closed before rdb snapshot finished"));
        }
        output.write_all(&buf[..n]).await?;
        counters.bytes_written.fetch_add(n as i64, Ordering::Relaxed);
        remaining -= n as u64;
    }
    output.flush().await?;
    info!(bytes = counters.bytes_written.load(Ordering::Relaxed), "dump: rdb snapshot written");

    if let Some(aof_path) = &args.aof {
        let mut aof = tokio::fs::File::create(aof_path).await?;
        loop {
            let n = spill_reader.read_some(&mut buf).await?;
            if n == 0 {
                break;
            }
            aof.write_all(&buf[..n]).await?;
            counters.bytes_written.fetch_add(n as i64, Ordering::Relaxed);
        }
        aof.flush().await?;
        info!("dump: backlog capture complete");
    }

    spill_reader.close().await;
    handle.task.abort();
    info!("dump: done");
    Ok(())
}
