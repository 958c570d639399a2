//! Quicklist: an outer count of inner nodes, each itself an RDB string
//! whose bytes are a classic ziplist (quicklist v1) or, for quicklist v2,
//! preceded by a one-byte container tag (`1` = PLAIN, a single raw element;
//! `2` = PACKED, a listpack). Concatenating every node's elements in order
//! is the logical list.

use std::io::Read;

use bytes::Bytes;

use crate::rdb::containers::{listpack, ziplist};
use crate::rdb::primitives;
use crate::rdb::reader::ChecksummedReader;
use crate::rdb::RdbError;

const CONTAINER_PLAIN: i64 = 1;
const CONTAINER_PACKED: i64 = 2;

/// Classic (v1) quicklist: `node_count` nodes, each a ziplist blob.
pub fn decode_v1<R: Read>(
    r: &mut ChecksummedReader<R>,
    node_count: usize,
) -> Result<Vec<Bytes>, RdbError> {
    let mut out = Vec::new();
    for _ in 0..node_count {
        let blob = primitives::read_string(r)?;
        out.extend(ziplist::decode_all(blob, None)?);
    }
    Ok(out)
}

/// Quicklist v2: `node_count` nodes, each a container-tagged blob.
pub fn decode_v2<R: Read>(
    r: &mut ChecksummedReader<R>,
    node_count: usize,
) -> Result<Vec<Bytes>, RdbError> {
    let mut out = Vec::new();
    for _ in 0..node_count {
        let container = primitives::read_plain_length(r)? as i64;
        let blob = primitives::read_string(r)?;
        match container {
            CONTAINER_PLAIN => out.push(blob),
            CONTAINER_PACKED => out.extend(listpack::decode_all(blob, None)?),
            other => {
                return Err(RdbError::UnknownOpcode {
                    opcode: other as u8,
                    offset: r.position(),
                })
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ziplist_blob(entries: &[&[u8]]) -> Vec<u8> {
        let mut body = Vec::new();
        for e in entries {
            body.push(0u8);
            body.push(e.len() as u8);
            body.extend_from_slice(e);
        }
        body.push(0xFF);
        let total = 10 + body.len();
        let mut buf = Vec::new();
        buf.extend_from_slice(&(total as u32).to_le_bytes());
        buf.extend_from_slice(&(total as u32).to_le_bytes());
        buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        buf.extend_from_slice(&body);
        buf
    }

    fn encode_length(len: usize) -> Vec<u8> {
        vec![len as u8]
    }

    #[test]
    fn v1_concatenates_two_nodes() {
        let node1 = ziplist_blob(&[b"a", b"b"]);
        let node2 = ziplist_blob(&[b"c"]);
        let mut bytes = Vec::new();
        bytes.extend(encode_length(node1.len()));
        bytes.extend_from_slice(&node1);
        bytes.extend(encode_length(node2.len()));
        bytes.extend_from_slice(&node2);
        let mut r = ChecksummedReader::new(Cursor::new(bytes));
        let items = decode_v1(&mut r, 2).unwrap();
        assert_eq!(items, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b"), Bytes::from_static(b"c")]);
    }
}
