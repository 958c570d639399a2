//! `decode`: load an RDB file (or stdin) and write one JSON record per
//! element to `--output` (or stdout). No network involved — this is the
//! offline inspection path.

use std::io::Read;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::info;

use crate::cli::DecodeArgs;
use crate::commands::open_output;
use crate::config;
use crate::errors::{AppError, AppResult};
use crate::progress::{self, ProgressCounters};
use crate::rdb::{self, LoadMessage};
use crate::sink::{EntrySink, JsonSink};

pub async fn run(args: DecodeArgs) -> AppResult<()> {
    let parallel = config::resolve_parallel(args.common.ncpu);
    let db_filter = config::parse_db_filter(args.common.db);

    let (source, input_size): (Box<dyn Read + Send>, Option<i64>) = match &args.input {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            let size = file.metadata()?.len() as i64;
            (Box::new(file), Some(size))
        }
        None => (Box::new(std::io::stdin()), None),
    };

    let output = open_output(args.output.as_deref()).await?;
    let sink = Arc::new(JsonSink::new(output));

    let (tx, mut rx) = tokio::sync::mpsc::channel::<LoadMessage>(parallel * 32);
    let counters = Arc::new(ProgressCounters::default());

    let counted = progress::CountingReader::new(source, counters.clone());
    let loader_task = tokio::task::spawn_blocking(move || {
        rdb::Loader::run(counted, &tx);
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let ticker_counters = counters.clone();
    let progress_task = tokio::spawn(progress::run_ticker(ticker_counters, input_size, "decode", shutdown_rx));

    let mut first_error = None;
    while let Some(msg) = rx.recv().await {
        match msg {
            LoadMessage::Entry(entry) => {
                if !db_filter(entry.db) {
                    counters.entries_skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                let n = sink.write_entry(&entry).await?;
                counters.entries_forwarded.fetch_add(n as u64, Ordering::Relaxed);
            }
            LoadMessage::Error(e) => first_error = Some(e),
        }
    }
    sink.flush().await?;

    loader_task
        .await
        .map_err(|e| AppError::semantic(format!("loader task panicked: {e}")))?;

    let _ = shutdown_tx.send(true);
    let _ = progress_task.await;

    if let Some(e) = first_error {
        return Err(AppError::Corruption(e));
    }

    info!(
        records = counters.entries_forwarded.load(Ordering::Relaxed),
        "decode: done"
    );
    Ok(())
}
