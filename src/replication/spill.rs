//! The spill pipe: a bounded single-producer/single-consumer byte stream
//! sitting between the replication socket and whatever drains it (the RDB
//! loader, then the backlog forwarder). Backed by a fixed-size ring, either
//! an in-memory buffer or a file on disk when `--tmpfile` is set, so a slow
//! consumer doesn't force the producer to buffer the whole snapshot in RAM.
//!
//! Offsets are 64-bit monotonic counters; the physical position in the ring
//! is always `offset % capacity`. Blocking semantics are built on
//! `tokio::sync::Notify` rather than condition variables, since everything
//! here already lives on the async side.

use std::io;
use std::io::{Read, Seek, SeekFrom, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{Mutex, Notify};

enum Store {
    Memory(Vec<u8>),
    File(std::fs::File),
}

impl Store {
    fn write_at(&mut self, start: usize, buf: &[u8]) -> io::Result<()> {
        match self {
            Store::Memory(v) => {
                v[start..start + buf.len()].copy_from_slice(buf);
                Ok(())
            }
            Store::File(f) => {
                f.seek(SeekFrom::Start(start as u64))?;
                f.write_all(buf)
            }
        }
    }

    fn read_at(&mut self, start: usize, buf: &mut [u8]) -> io::Result<()> {
        match self {
            Store::Memory(v) => {
                buf.copy_from_slice(&v[start..start + buf.len()]);
                Ok(())
            }
            Store::File(f) => {
                f.seek(SeekFrom::Start(start as u64))?;
                f.read_exact(buf)
            }
        }
    }
}

struct RingState {
    capacity: usize,
    write_pos: u64,
    read_pos: u64,
    writer_closed: bool,
    reader_closed: bool,
    store: Store,
}

pub struct SpillPipe {
    state: Mutex<RingState>,
    not_empty: Notify,
    not_full: Notify,
}

impl SpillPipe {
    pub fn new_memory(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RingState {
                capacity,
                write_pos: 0,
                read_pos: 0,
                writer_closed: false,
                reader_closed: false,
                store: Store::Memory(vec![0u8; capacity]),
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        })
    }

    pub fn new_file(file: std::fs::File, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RingState {
                capacity,
                write_pos: 0,
                read_pos: 0,
                writer_closed: false,
                reader_closed: false,
                store: Store::File(file),
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        })
    }

    pub fn split(self: Arc<Self>) -> (SpillWriter, SpillReader) {
        (SpillWriter(self.clone()), SpillReader(self))
    }

    async fn write_some(&self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let mut st = self.state.lock().await;
            if st.reader_closed {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "spill pipe reader closed"));
            }
            let buffered = (st.write_pos - st.read_pos) as usize;
            if buffered == st.capacity {
                // Register as a waiter on `not_full` while still holding the
                // lock, so a reader that drains a byte and calls
                // `notify_waiters()` between our unlock and the `.await`
                // below can't be missed.
                let notified = self.not_full.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                drop(st);
                notified.await;
                continue;
            }
            let capacity = st.capacity;
            let space = capacity - buffered;
            let n = space.min(buf.len());
            let start = (st.write_pos % capacity as u64) as usize;
            let write_len = n.min(capacity - start);
            st.store.write_at(start, &buf[..write_len])?;
            st.write_pos += write_len as u64;
            drop(st);
            self.not_empty.notify_waiters();
            return Ok(write_len);
        }
    }

    async fn read_some(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let mut st = self.state.lock().await;
            let buffered = (st.write_pos - st.read_pos) as usize;
            if buffered == 0 {
                if st.writer_closed {
                    return Ok(0);
                }
                // Same race guard as `write_some`: register on `not_empty`
                // before releasing the lock, so a write that lands in the
                // gap between unlock and `.await` still wakes us.
                let notified = self.not_empty.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                drop(st);
                notified.await;
                continue;
            }
            let capacity = st.capacity;
            let n = buffered.min(buf.len());
            let start = (st.read_pos % capacity as u64) as usize;
            let read_len = n.min(capacity - start);
            st.store.read_at(start, &mut buf[..read_len])?;
            st.read_pos += read_len as u64;
            let drained = st.read_pos == st.write_pos;
            if drained {
                if let Store::File(f) = &st.store {
                    let _ = f.set_len(0);
                }
            }
            drop(st);
            self.not_full.notify_waiters();
            return Ok(read_len);
        }
    }

    async fn close_writer(&self) {
        let mut st = self.state.lock().await;
        st.writer_closed = true;
        drop(st);
        self.not_empty.notify_waiters();
    }

    async fn close_reader(&self) {
        let mut st = self.state.lock().await;
        st.reader_closed = true;
        drop(st);
        self.not_full.notify_waiters();
    }
}

#[derive(Clone)]
pub struct SpillWriter(Arc<SpillPipe>);

impl SpillWriter {
    pub async fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let n = self.0.write_some(buf).await?;
            buf = &buf[n..];
        }
        Ok(())
    }

    pub async fn close(self) {
        self.0.close_writer().await;
    }
}

pub struct SpillReader(Arc<SpillPipe>);

impl SpillReader {
    pub async fn read_some(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read_some(buf).await
    }

    pub async fn close(self) {
        self.0.close_reader().await;
    }

    /// Bridge to `tokio::io::AsyncRead`, for feeding the backlog forwarder
    /// (which reads RESP frames through a `BufReader`) once the RDB prefix
    /// has been fully consumed.
    pub fn into_async_read(self) -> SpillAsyncReader {
        SpillAsyncReader {
            pipe: self.0,
            pending: None,
        }
    }

    /// Bridge to `std::io::Read`, for driving the synchronous RDB loader
    /// inside `spawn_blocking`.
    pub fn into_blocking(self, handle: tokio::runtime::Handle) -> BlockingSpillReader {
        BlockingSpillReader { pipe: self.0, handle }
    }
}

pub struct BlockingSpillReader {
    pipe: Arc<SpillPipe>,
    handle: tokio::runtime::Handle,
}

impl BlockingSpillReader {
    /// Recover the async-side reader once the blocking task is done with it
    /// (typically after wrapping it in `Read::take(rdb_size)` and handing
    /// that to the loader).
    pub fn into_inner(self) -> SpillReader {
        SpillReader(self.pipe)
    }
}

impl Read for BlockingSpillReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pipe = self.pipe.clone();
        self.handle.block_on(async move { pipe.read_some(buf).await })
    }
}

pub struct SpillAsyncReader {
    pipe: Arc<SpillPipe>,
    pending: Option<Pin<Box<dyn std::future::Future<Output = io::Result<Vec<u8>>> + Send>>>,
}

impl AsyncRead for SpillAsyncReader {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        loop {
            if let Some(fut) = self.pending.as_mut() {
                return match fut.as_mut().poll(cx) {
                    Poll::Ready(Ok(data)) => {
                        self.pending = None;
                        buf.put_slice(&data);
                        Poll::Ready(Ok(()))
                    }
                    Poll::Ready(Err(e)) => {
                        self.pending = None;
                        Poll::Ready(Err(e))
                    }
                    Poll::Pending => Poll::Pending,
                };
            }
            let pipe = self.pipe.clone();
            let want = buf.remaining();
            self.pending = Some(Box::pin(async move {
                let mut tmp = vec![0u8; want];
                let n = pipe.read_some(&mut tmp).await?;
                tmp.truncate(n);
                Ok(tmp)
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_reads_roundtrip() {
        let pipe = SpillPipe::new_memory(16);
        let (writer, reader) = pipe.split();
        writer.write_all(b"hello world").await.unwrap();
        writer.clone().close().await;
        let mut buf = [0u8; 32];
        let mut total = Vec::new();
        loop {
            let n = reader.read_some(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            total.extend_from_slice(&buf[..n]);
        }
        assert_eq!(total, b"hello world");
    }

    #[tokio::test]
    async fn write_wraps_around_small_ring() {
        let pipe = SpillPipe::new_memory(4);
        let (writer, reader) = pipe.split();
        let w = tokio::spawn(async move {
            writer.write_all(b"abcdefgh").await.unwrap();
            writer.close().await;
        });
        let mut out = Vec::new();
        let mut buf = [0u8; 3];
        loop {
            let n = reader.read_some(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        w.await.unwrap();
        assert_eq!(out, b"abcdefgh");
    }

    #[tokio::test]
    async fn closing_reader_unblocks_writer_with_error() {
        let pipe = SpillPipe::new_memory(2);
        let (writer, reader) = pipe.split();
        writer.write_all(b"ab").await.unwrap();
        reader.close().await;
        let err = writer.write_all(b"cd").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
