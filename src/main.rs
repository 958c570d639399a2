//! RDB decode/dump/restore/sync: a replication and migration tool for a
//! RESP-speaking keyspace server.

use clap::Parser;
use tracing::{error, info};

use redis_port::cli::Cli;
use redis_port::logging;

#[tokio::main]
async fn main() {
    logging::init();

    let cli = Cli::parse();
    match redis_port::run(cli).await {
        Ok(()) => {
            info!("done");
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}
