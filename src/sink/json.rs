//! Newline-delimited JSON sink: one object per element (list/hash/set/zset)
//! or per string, plus an `"type":"expire"` record when the entry carries a
//! TTL. Field names and per-type shapes are fixed, not derived from the
//! value's Rust representation, since they're part of the output contract.

use serde_json::{json, Value as Json};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::rdb::{Entry, Value};
use crate::sink::EntrySink;

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn score_json(score: f64) -> Json {
    if score.is_finite() {
        json!(score)
    } else {
        json!(score.to_string())
    }
}

pub struct JsonSink<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }

    fn records(entry: &Entry) -> Vec<Json> {
        let db = entry.db;
        let key = lossy(&entry.key);
        let mut records = Vec::new();

        match &entry.value {
            Value::Str(s) => records.push(json!({"db": db, "type": "string", "key": key, "value": lossy(s)})),
            Value::List(items) => {
                for (index, v) in items.iter().enumerate() {
                    records.push(json!({"db": db, "type": "list", "key": key, "index": index, "value": lossy(v)}));
                }
            }
            Value::Hash(pairs) => {
                for (field, v) in pairs {
                    records.push(json!({"db": db, "type": "hash", "key": key, "field": lossy(field), "value": lossy(v)}));
                }
            }
            Value::Set(members) => {
                for m in members {
                    records.push(json!({"db": db, "type": "dict", "key": key, "member": lossy(m)}));
                }
            }
            Value::ZSet(pairs) => {
                for (member, score) in pairs {
                    records.push(json!({"db": db, "type": "zset", "key": key, "member": lossy(member), "score": score_json(*score)}));
                }
            }
        }

        if let Some(expire_at) = entry.expire_at_ms {
            records.push(json!({"db": db, "type": "expire", "key": key, "expireat": expire_at}));
        }

        records
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> EntrySink for JsonSink<W> {
    async fn write_entry(&self, entry: &Entry) -> std::io::Result<usize> {
        let records = Self::records(entry);
        let mut buf = Vec::new();
        for record in &records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        let mut w = self.writer.lock().await;
        w.write_all(&buf).await?;
        Ok(records.len())
    }

    async fn flush(&self) -> std::io::Result<()> {
        self.writer.lock().await.flush().await
    }
}
