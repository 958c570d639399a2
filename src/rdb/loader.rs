//! The loader driver: the opcode dispatch loop that turns a checksummed
//! byte stream into a sequence of `Entry` values, exactly as laid out in
//! the RDB container format (header, opcode-framed records, `EOF`, optional
//! checksum footer).
//!
//! Runs synchronously (plain `std::io::Read`) and is meant to be driven
//! inside `tokio::task::spawn_blocking`, pushing messages with
//! `Sender::blocking_send` — the same "one producer task" shape the rest of
//! the pipeline assumes, without tying the parser itself to async.

use std::io::Read;
use std::sync::Arc;

use tokio::sync::mpsc::Sender;
use tracing::{debug, warn};

use crate::rdb::entry::{Entry, LoadMessage};
use crate::rdb::opcodes::*;
use crate::rdb::primitives;
use crate::rdb::reader::ChecksummedReader;
use crate::rdb::value;
use crate::rdb::RdbError;

pub struct Loader;

impl Loader {
    /// Drive `source` to completion (or first fatal error), sending
    /// `LoadMessage`s to `tx`. On error, one final `LoadMessage::Error` is
    /// sent before returning; there is no partial-file recovery.
    pub fn run<R: Read>(source: R, tx: &Sender<LoadMessage>) {
        if let Err(e) = Self::run_inner(source, tx) {
            let _ = tx.blocking_send(LoadMessage::Error(e));
        }
    }

    fn run_inner<R: Read>(source: R, tx: &Sender<LoadMessage>) -> Result<(), RdbError> {
        let mut r = ChecksummedReader::new(source);

        let magic = r.read_vec(5)?;
        if magic != b"REDIS" {
            return Err(RdbError::BadMagic(magic));
        }
        let version_bytes = r.read_vec(4)?;
        let version_str = std::str::from_utf8(&version_bytes).map_err(|_| RdbError::BadMagic(version_bytes.clone()))?;
        let version: u32 = version_str
            .parse()
            .map_err(|_| RdbError::UnsupportedVersion(0))?;
        if version < MIN_SUPPORTED_VERSION || version > MAX_SUPPORTED_VERSION {
            return Err(RdbError::UnsupportedVersion(version));
        }
        debug!(version, "RDB header parsed");

        let mut current_db: u64 = 0;
        let mut pending_expire: Option<i64> = None;

        loop {
            let opcode = r.read_u8()?;
            match opcode {
                OP_AUX => {
                    let key = primitives::read_string(&mut r)?;
                    let value = primitives::read_string(&mut r)?;
                    debug!(key = ?key, value = ?value, "RDB aux field (discarded)");
                }
                OP_RESIZEDB => {
                    let main_size = primitives::read_plain_length(&mut r)?;
                    let expires_size = primitives::read_plain_length(&mut r)?;
                    debug!(main_size, expires_size, "RDB resize hint (discarded)");
                }
                OP_SELECTDB => {
                    current_db = primitives::read_plain_length(&mut r)? as u64;
                    debug!(db = current_db, "RDB select db");
                }
                OP_EXPIRETIME => {
                    let secs = r.read_u32_le()?;
                    pending_expire = Some(secs as i64 * 1000);
                }
                OP_EXPIRETIME_MS => {
                    let ms = r.read_u64_le()?;
                    pending_expire = Some(ms as i64);
                }
                OP_EOF => break,
                type_byte => {
                    let key = primitives::read_string(&mut r)?;
                    let value = value::read_value(&mut r, type_byte, current_db, &key)?;
                    let entry = Entry {
                        db: current_db,
                        expire_at_ms: pending_expire.take(),
                        key,
                        value,
                    };
                    if tx.blocking_send(LoadMessage::Entry(Arc::new(entry))).is_err() {
                        // Receiver gone: downstream has stopped, nothing left to do.
                        return Ok(());
                    }
                }
            }
        }

        if version >= VERSION_WITH_CHECKSUM {
            let computed = r.checksum();
            let stored = r.read_u64_le()?;
            if stored == 0 {
                warn!("RDB checksum verification disabled (stored checksum is zero)");
            } else if stored != computed {
                return Err(RdbError::ChecksumMismatch { stored, computed });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdb::crc64;
    use std::io::Cursor;
    use tokio::sync::mpsc;

    fn build_rdb(version: &str, body: &[u8], checksum: bool) -> Vec<u8> {
        let mut rdb = Vec::new();
        rdb.extend_from_slice(b"REDIS");
        rdb.extend_from_slice(version.as_bytes());
        rdb.extend_from_slice(body);
        rdb.push(OP_EOF);
        if checksum {
            let sum = crc64::crc64(&rdb);
            rdb.extend_from_slice(&sum.to_le_bytes());
        }
        rdb
    }

    fn drain(rx: &mut mpsc::Receiver<LoadMessage>) -> Vec<LoadMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn empty_db_with_checksum() {
        let rdb = build_rdb("0006", &[OP_SELECTDB, 0x00].to_vec(), true);
        let (tx, mut rx) = mpsc::channel(8);
        Loader::run(Cursor::new(rdb), &tx);
        drop(tx);
        let msgs = drain(&mut rx);
        assert!(msgs.is_empty());
    }

    #[test]
    fn two_dbs_simple_strings() {
        let mut body = Vec::new();
        body.push(OP_SELECTDB);
        body.push(0x00);
        body.push(TYPE_STRING);
        body.push(0x01);
        body.push(b'a');
        body.push(0x01);
        body.push(b'1');
        body.push(OP_SELECTDB);
        body.push(0x02);
        body.push(TYPE_STRING);
        body.push(0x01);
        body.push(b'b');
        body.push(0x01);
        body.push(b'2');
        let rdb = build_rdb("0006", &body, true);
        let (tx, mut rx) = mpsc::channel(8);
        Loader::run(Cursor::new(rdb), &tx);
        drop(tx);
        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 2);
        match &msgs[0] {
            LoadMessage::Entry(e) => {
                assert_eq!(e.db, 0);
                assert_eq!(&e.key[..], b"a");
            }
            _ => panic!("expected entry"),
        }
        match &msgs[1] {
            LoadMessage::Entry(e) => assert_eq!(e.db, 2),
            _ => panic!("expected entry"),
        }
    }

    #[test]
    fn truncated_stream_is_fatal() {
        let rdb = b"REDIS0006".to_vec();
        let (tx, mut rx) = mpsc::channel(8);
        Loader::run(Cursor::new(rdb), &tx);
        drop(tx);
        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 1);
        assert!(matches!(msgs[0], LoadMessage::Error(_)));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let rdb = b"NOTRDB0006".to_vec();
        let (tx, mut rx) = mpsc::channel(8);
        Loader::run(Cursor::new(rdb), &tx);
        drop(tx);
        let msgs = drain(&mut rx);
        assert!(matches!(msgs[0], LoadMessage::Error(RdbError::BadMagic(_))));
    }

    #[test]
    fn older_version_without_checksum() {
        let mut body = Vec::new();
        body.push(OP_SELECTDB);
        body.push(0x00);
        body.push(TYPE_STRING);
        body.push(0x03);
        body.extend_from_slice(b"old");
        body.push(0x03);
        body.extend_from_slice(b"val");
        let rdb = build_rdb("0003", &body, false);
        let (tx, mut rx) = mpsc::channel(8);
        Loader::run(Cursor::new(rdb), &tx);
        drop(tx);
        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 1);
    }
}
