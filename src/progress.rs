//! Human-readable byte formatting and the once-a-second progress ticker
//! every command runs while it works.

use std::io::Read;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

pub fn human_bytes(n: i64) -> String {
    let negative = n < 0;
    let mut value = n.unsigned_abs() as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let sign = if negative { "-" } else { "" };
    if unit == 0 {
        format!("{sign}{value:.0}{}", UNITS[unit])
    } else {
        format!("{sign}{value:.2}{}", UNITS[unit])
    }
}

#[derive(Debug, Default)]
pub struct ProgressCounters {
    pub bytes_read: AtomicI64,
    pub bytes_written: AtomicI64,
    pub entries_forwarded: AtomicU64,
    pub entries_skipped: AtomicU64,
}

/// Ticks once a second until `shutdown` fires, logging a single progress
/// line built from whatever counters are non-zero-interesting. `total_size`
/// drives the percentage column when known (a file input); it's absent for
/// a live replication stream, which has no fixed endpoint.
pub async fn run_ticker(
    counters: Arc<ProgressCounters>,
    total_size: Option<i64>,
    label: &str,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
        let read = counters.bytes_read.load(Ordering::Relaxed);
        let written = counters.bytes_written.load(Ordering::Relaxed);
        let forwarded = counters.entries_forwarded.load(Ordering::Relaxed);
        let skipped = counters.entries_skipped.load(Ordering::Relaxed);
        match total_size.filter(|&t| t > 0) {
            Some(total) => {
                let percent = read as f64 * 100.0 / total as f64;
                info!(
                    "{label}: read={} written={} forwarded={forwarded} skipped={skipped} ({percent:.2}%)",
                    human_bytes(read),
                    human_bytes(written),
                );
            }
            None => {
                info!(
                    "{label}: read={} written={} forwarded={forwarded} skipped={skipped}",
                    human_bytes(read),
                    human_bytes(written),
                );
            }
        }
    }
}

/// Wraps a `Read` and folds every byte it yields into `counters.bytes_read`,
/// so a synchronous loader running in `spawn_blocking` can still feed the
/// progress ticker.
pub struct CountingReader<R> {
    inner: R,
    counters: Arc<ProgressCounters>,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R, counters: Arc<ProgressCounters>) -> Self {
        Self { inner, counters }
    }

    /// Recover the wrapped reader once progress tracking is no longer
    /// needed (e.g. to hand the underlying spill reader to the backlog
    /// forwarder after the RDB prefix has been consumed).
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counters.bytes_read.fetch_add(n as i64, Ordering::Relaxed);
        Ok(n)
    }
}
