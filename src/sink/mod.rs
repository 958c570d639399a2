//! Entry sinks: where `decode` writes the entries it loads.

pub mod json;

pub use json::JsonSink;

#[async_trait::async_trait]
pub trait EntrySink: Send + Sync {
    /// Write every JSON record this entry expands to (one per element for
    /// list/hash/set/zset, one for a string, plus an optional expire
    /// record). Returns how many records were written, for progress
    /// counting.
    async fn write_entry(&self, entry: &crate::rdb::Entry) -> std::io::Result<usize>;

    async fn flush(&self) -> std::io::Result<()>;
}
