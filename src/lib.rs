//! RDB decode/dump/restore/sync: a replication and migration tool for a
//! RESP-speaking keyspace server.
//!
//! Split into a library (this crate) and a thin binary (`src/main.rs`) so
//! the RDB loader, PSYNC client, and migration engine are exercisable from
//! `tests/` with hand-built fixtures, without going through the CLI.

pub mod cli;
pub mod commands;
pub mod config;
pub mod errors;
pub mod logging;
pub mod migration;
pub mod net;
pub mod progress;
pub mod rdb;
pub mod replication;
pub mod sink;

use crate::cli::{Cli, Command};
use crate::errors::AppResult;

pub async fn run(cli: Cli) -> AppResult<()> {
    match cli.command {
        Command::Decode(args) => commands::decode::run(args).await,
        Command::Dump(args) => commands::dump::run(args).await,
        Command::Restore(args) => commands::restore::run(args).await,
        Command::Sync(args) => commands::sync::run(args).await,
    }
}
