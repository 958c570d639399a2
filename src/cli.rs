//! The `decode`/`dump`/`restore`/`sync` CLI surface.

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "redis-port",
    version,
    about = "RDB decode/dump/restore/sync: a replication and migration tool for a RESP-speaking keyspace server"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode an RDB file (or stdin) into newline-delimited JSON.
    Decode(DecodeArgs),
    /// Capture a live snapshot (and optionally the following backlog) from a master.
    Dump(DumpArgs),
    /// Load an RDB file (and optionally a captured backlog) into a target.
    Restore(RestoreArgs),
    /// Continuously replicate a master's snapshot and backlog into a target.
    Sync(SyncArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// CPU count to size the worker pool from; defaults to the host's.
    #[arg(long, default_value_t = default_ncpu())]
    pub ncpu: usize,
    /// Only process this db index; all others are skipped.
    #[arg(long)]
    pub db: Option<u64>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// RDB file to read; stdin if omitted.
    #[arg(long)]
    pub input: Option<String>,
    /// JSON output file; stdout if omitted.
    #[arg(long)]
    pub output: Option<String>,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Master endpoint as `[auth@]host:port`.
    #[arg(long)]
    pub master: String,
    /// RDB output file; stdout if omitted.
    #[arg(long)]
    pub output: Option<String>,
    /// Capture the backlog following the snapshot to this file.
    #[arg(long)]
    pub aof: Option<String>,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// RDB file to load; stdin if omitted.
    #[arg(long)]
    pub input: Option<String>,
    /// Target endpoint as `[auth@]host:port`.
    #[arg(long)]
    pub target: String,
    /// Previously captured backlog file to replay after the RDB load.
    #[arg(long)]
    pub aof: Option<String>,
    /// Re-base every expiry; see the design notes for the accepted forms.
    #[arg(long = "unixtime-in-milliseconds")]
    pub unixtime_in_milliseconds: Option<String>,
    /// Use `RESTORE ... REPLACE` instead of broken-down commands for small values.
    #[arg(long)]
    pub use_restore_command: bool,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Master endpoint as `[auth@]host:port`.
    #[arg(long)]
    pub master: String,
    /// Target endpoint as `[auth@]host:port`.
    #[arg(long)]
    pub target: String,
    /// Also capture the backlog to this file, in addition to forwarding it.
    #[arg(long)]
    pub aof: Option<String>,
    /// Spill the snapshot/backlog buffer to this file instead of memory.
    #[arg(long)]
    pub tmpfile: Option<String>,
    /// Spill buffer capacity in bytes.
    #[arg(long = "tmpfile-size", default_value_t = 1 << 30)]
    pub tmpfile_size: u64,
    /// Use `RESTORE ... REPLACE` instead of broken-down commands for small values.
    #[arg(long)]
    pub use_restore_command: bool,
    #[command(flatten)]
    pub common: CommonArgs,
}

fn default_ncpu() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
