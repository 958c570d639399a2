//! A single loaded keyspace entry, and the message type the loader ships
//! down the entry channel.

use bytes::Bytes;

use crate::rdb::value::Value;
use crate::rdb::RdbError;

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub db: u64,
    pub expire_at_ms: Option<i64>,
    pub key: Bytes,
    pub value: Value,
}

impl Entry {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expire_at_ms, Some(at) if at <= now_ms)
    }
}

/// What the loader sends over the bounded entry channel. Reference-counted
/// lifetime is realized as `Arc<Entry>` at the channel boundary (see
/// `rdb::loader`): forking an entry across consumers is `Arc::clone`,
/// release is `Drop`, and the last drop frees the backing buffers. A fatal
/// load error is delivered as one final `Err` message before the sender
/// closes, so consumers can distinguish "producer is done" from "producer
/// failed partway through".
#[derive(Debug)]
pub enum LoadMessage {
    Entry(std::sync::Arc<Entry>),
    Error(RdbError),
}
