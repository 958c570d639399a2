//! Dump payload codec: `RESTORE`'s argument format.
//! `<type-byte><payload><rdb-version u16 LE><CRC64 u64 LE>`. The payload
//! uses the same wire encodings as in-file RDB values; we always write the
//! "plain" (non-compact) encodings on the way out, since the dump-payload
//! contract only requires that `RESTORE` on the receiving end understand it
//! — not that we reproduce whatever compact form the source used.

use std::io::Cursor;

use crate::rdb::crc64;
use crate::rdb::opcodes::*;
use crate::rdb::primitives;
use crate::rdb::reader::ChecksummedReader;
use crate::rdb::value::{self, Value};
use crate::rdb::RdbError;

pub fn encode_dump_payload(value: &Value, rdb_version: u16) -> Vec<u8> {
    let mut out = Vec::new();
    match value {
        Value::Str(s) => {
            out.push(TYPE_STRING);
            primitives::encode_string(&mut out, s);
        }
        Value::List(items) => {
            out.push(TYPE_LIST);
            out.extend(primitives::encode_length(items.len()));
            for item in items {
                primitives::encode_string(&mut out, item);
            }
        }
        Value::Set(items) => {
            out.push(TYPE_SET);
            out.extend(primitives::encode_length(items.len()));
            for item in items {
                primitives::encode_string(&mut out, item);
            }
        }
        Value::Hash(pairs) => {
            out.push(TYPE_HASH);
            out.extend(primitives::encode_length(pairs.len()));
            for (field, val) in pairs {
                primitives::encode_string(&mut out, field);
                primitives::encode_string(&mut out, val);
            }
        }
        Value::ZSet(pairs) => {
            out.push(TYPE_ZSET_2);
            out.extend(primitives::encode_length(pairs.len()));
            for (member, score) in pairs {
                primitives::encode_string(&mut out, member);
                out.extend_from_slice(&score.to_le_bytes());
            }
        }
    }
    out.extend_from_slice(&rdb_version.to_le_bytes());
    let checksum = crc64::crc64(&out);
    out.extend_from_slice(&checksum.to_le_bytes());
    out
}

pub fn decode_dump_payload(bytes: &[u8]) -> Result<(Value, u16), RdbError> {
    if bytes.len() < 1 + 2 + 8 {
        return Err(RdbError::Truncated {
            offset: 0,
            wanted: 11 - bytes.len(),
        });
    }
    let (body, checksum_bytes) = bytes.split_at(bytes.len() - 8);
    let stored = u64::from_le_bytes(checksum_bytes.try_into().unwrap());
    if stored != 0 {
        let computed = crc64::crc64(body);
        if computed != stored {
            return Err(RdbError::ChecksumMismatch {
                stored,
                computed,
            });
        }
    }
    let (payload_and_type, version_bytes) = body.split_at(body.len() - 2);
    let rdb_version = u16::from_le_bytes(version_bytes.try_into().unwrap());

    let mut reader = ChecksummedReader::new(Cursor::new(payload_and_type.to_vec()));
    let type_byte = reader.read_u8()?;
    let value = value::read_value(&mut reader, type_byte, 0, b"")?;
    Ok((value, rdb_version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn string_roundtrip() {
        let v = Value::Str(Bytes::from_static(b"hello"));
        let payload = encode_dump_payload(&v, 11);
        let (decoded, version) = decode_dump_payload(&payload).unwrap();
        assert_eq!(decoded, v);
        assert_eq!(version, 11);
    }

    #[test]
    fn list_roundtrip() {
        let v = Value::List(vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        let payload = encode_dump_payload(&v, 11);
        let (decoded, _) = decode_dump_payload(&payload).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn zset_roundtrip_preserves_bit_pattern() {
        let v = Value::ZSet(vec![
            (Bytes::from_static(b"m"), f64::NAN),
            (Bytes::from_static(b"n"), 3.25),
        ]);
        let payload = encode_dump_payload(&v, 11);
        let (decoded, _) = decode_dump_payload(&payload).unwrap();
        if let Value::ZSet(entries) = decoded {
            assert!(entries[0].1.is_nan());
            assert_eq!(entries[1].1, 3.25);
        } else {
            panic!("expected zset");
        }
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let v = Value::Str(Bytes::from_static(b"x"));
        let mut payload = encode_dump_payload(&v, 11);
        let last = payload.len() - 1;
        payload[last] ^= 0xFF;
        assert!(decode_dump_payload(&payload).is_err());
    }

    #[test]
    fn zero_checksum_disables_verification() {
        let v = Value::Str(Bytes::from_static(b"x"));
        let mut payload = encode_dump_payload(&v, 11);
        let len = payload.len();
        for b in &mut payload[len - 8..] {
            *b = 0;
        }
        assert!(decode_dump_payload(&payload).is_ok());
    }
}
