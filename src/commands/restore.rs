//! `restore`: load an RDB file (or stdin) into `--target`, then optionally
//! replay a previously captured `--aof` backlog against the same target.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::BufReader;
use tracing::info;

use crate::cli::RestoreArgs;
use crate::config;
use crate::errors::{AppError, AppResult};
use crate::migration::{AofEofPolicy, BacklogForwarder, MigrationEngine, MigrationStats};
use crate::net::connection::{self, Endpoint};
use crate::progress::{self, ProgressCounters};
use crate::rdb::{self, LoadMessage};

pub async fn run(args: RestoreArgs) -> AppResult<()> {
    let parallel = config::resolve_parallel(args.common.ncpu);
    let db_filter = config::parse_db_filter(args.common.db);
    let now_ms = chrono::Utc::now().timestamp_millis();
    let expire_shift_ms = match &args.unixtime_in_milliseconds {
        Some(expr) => config::parse_expire_shift(expr, now_ms)?,
        None => 0,
    };
    let target = Endpoint::parse(&args.target);
    let stats = Arc::new(MigrationStats::default());

    if let Some(input_path) = &args.input {
        let file = std::fs::File::open(input_path)?;
        let size = file.metadata()?.len() as i64;
        let counters = Arc::new(ProgressCounters::default());
        let counted = progress::CountingReader::new(file, counters.clone());

        let (tx, rx) = tokio::sync::mpsc::channel::<LoadMessage>(parallel * 32);
        let loader_task = tokio::task::spawn_blocking(move || {
            rdb::Loader::run(counted, &tx);
        });

        let engine = MigrationEngine::new(
            target.clone(),
            parallel,
            db_filter.clone(),
            expire_shift_ms,
            args.use_restore_command,
            rdb::opcodes::MAX_SUPPORTED_VERSION as u16,
        );
        engine.run(rx, stats.clone()).await?;

        loader_task
            .await
            .map_err(|e| AppError::semantic(format!("loader task panicked: {e}")))?;

        info!(bytes_read = counters.bytes_read.load(Ordering::Relaxed), size, "restore: rdb input processed");
    } else if args.aof.is_none() {
        return Err(AppError::semantic("restore requires --input, --aof, or both"));
    }

    if let Some(aof_path) = &args.aof {
        let file = tokio::fs::File::open(aof_path).await?;
        let mut reader = BufReader::new(file);

        let stream = connection::dial(&target.addr)
            .await
            .map_err(|e| AppError::transport(format!("dial target {} failed", target.addr), e))?;
        let (rd, mut writer) = stream.into_split();
        let mut target_reader = BufReader::new(rd);
        connection::authenticate(&mut target_reader, &mut writer, target.auth.as_deref())
            .await
            .map_err(|e| AppError::transport("target AUTH failed", e))?;
        let drain_handle = connection::spawn_reply_drain(target_reader);

        let forwarder = BacklogForwarder::new(db_filter.clone(), AofEofPolicy::TreatAsStreamEnd);
        let forward_result = forwarder.forward(&mut reader, &mut writer, stats.clone()).await;
        drain_handle.abort();
        forward_result?;
        info!("restore: aof backlog replayed");
    }

    info!(
        forwarded = stats.forwarded.load(Ordering::Relaxed),
        skipped = stats.skipped.load(Ordering::Relaxed),
        "restore: done"
    );
    Ok(())
}
