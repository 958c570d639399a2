//! The four subcommand drivers: `decode`, `dump`, `restore`, `sync`.

pub mod decode;
pub mod dump;
pub mod restore;
pub mod sync;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::errors::AppResult;

/// Open `--output`/`--input`-style flags: a named file, or stdout/stdin
/// when the flag is omitted.
pub async fn open_output(path: Option<&str>) -> AppResult<Box<dyn AsyncWrite + Unpin + Send>> {
    match path {
        Some(p) => Ok(Box::new(tokio::fs::File::create(p).await?)),
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

pub async fn flush_and_shutdown<W: AsyncWrite + Unpin>(w: &mut W) -> AppResult<()> {
    w.flush().await?;
    Ok(())
}
