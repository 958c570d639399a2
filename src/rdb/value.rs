//! The object materializer: maps a type byte plus the already-decoded key
//! to a typed `Value`, dispatching through the container decoders for every
//! compact encoding.
//!
//! `Value` fully materializes its elements into a `Vec` rather than staying
//! lazy end to end. This is a deliberate simplification: RDB payloads are
//! already bounded by the object's own wire size, and by the time a
//! migration worker forwards the value it needs random access to chunk it
//! into bounded-size restore commands anyway. The container decoders
//! underneath (`rdb::containers::*`) still walk their source buffer lazily;
//! only the final, already-small per-key collection is eager.

use std::io::Read;

use bytes::Bytes;

use crate::rdb::containers::{intset, listpack, quicklist, zipmap, ziplist};
use crate::rdb::opcodes::*;
use crate::rdb::primitives;
use crate::rdb::reader::ChecksummedReader;
use crate::rdb::RdbError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(Bytes),
    List(Vec<Bytes>),
    Hash(Vec<(Bytes, Bytes)>),
    Set(Vec<Bytes>),
    ZSet(Vec<(Bytes, f64)>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "dict",
            Value::ZSet(_) => "zset",
        }
    }
}

fn parse_score(bytes: &Bytes) -> Result<f64, RdbError> {
    let s = std::str::from_utf8(bytes).map_err(|_| RdbError::BadLength { offset: 0 })?;
    s.parse::<f64>().map_err(|_| RdbError::BadLength { offset: 0 })
}

fn pairs_from_flat(flat: Vec<Bytes>) -> Vec<(Bytes, Bytes)> {
    flat.chunks_exact(2)
        .map(|c| (c[0].clone(), c[1].clone()))
        .collect()
}

fn zset_from_flat(flat: Vec<Bytes>) -> Result<Vec<(Bytes, f64)>, RdbError> {
    flat.chunks_exact(2)
        .map(|c| Ok((c[0].clone(), parse_score(&c[1])?)))
        .collect()
}

/// Read a value payload for `type_byte`, given the key it belongs to (for
/// diagnostics on the unsupported-type error).
pub fn read_value<R: Read>(
    r: &mut ChecksummedReader<R>,
    type_byte: u8,
    db: u64,
    key: &[u8],
) -> Result<Value, RdbError> {
    if is_unsupported_type(type_byte) {
        return Err(RdbError::UnsupportedType {
            db,
            key: key.to_vec(),
            type_byte,
        });
    }
    match type_byte {
        TYPE_STRING => Ok(Value::Str(primitives::read_string(r)?)),

        TYPE_LIST => {
            let n = primitives::read_plain_length(r)?;
            let mut items = Vec::with_capacity(n);
            for _ in 0..n {
                items.push(primitives::read_string(r)?);
            }
            Ok(Value::List(items))
        }

        TYPE_SET => {
            let n = primitives::read_plain_length(r)?;
            let mut items = Vec::with_capacity(n);
            for _ in 0..n {
                items.push(primitives::read_string(r)?);
            }
            Ok(Value::Set(items))
        }

        TYPE_ZSET => {
            let n = primitives::read_plain_length(r)?;
            let mut items = Vec::with_capacity(n);
            for _ in 0..n {
                let member = primitives::read_string(r)?;
                let score = primitives::read_double_legacy(r)?;
                items.push((member, score));
            }
            Ok(Value::ZSet(items))
        }

        TYPE_ZSET_2 => {
            let n = primitives::read_plain_length(r)?;
            let mut items = Vec::with_capacity(n);
            for _ in 0..n {
                let member = primitives::read_string(r)?;
                let score = primitives::read_double_v2(r)?;
                items.push((member, score));
            }
            Ok(Value::ZSet(items))
        }

        TYPE_HASH => {
            let n = primitives::read_plain_length(r)?;
            let mut items = Vec::with_capacity(n);
            for _ in 0..n {
                let field = primitives::read_string(r)?;
                let value = primitives::read_string(r)?;
                items.push((field, value));
            }
            Ok(Value::Hash(items))
        }

        TYPE_HASH_ZIPMAP => {
            let blob = primitives::read_string(r)?;
            Ok(Value::Hash(zipmap::decode_all(blob, None)?))
        }

        TYPE_LIST_ZIPLIST => {
            let blob = primitives::read_string(r)?;
            Ok(Value::List(ziplist::decode_all(blob, None)?))
        }

        TYPE_SET_INTSET => {
            let blob = primitives::read_string(r)?;
            let ints = intset::decode_all(blob)?;
            Ok(Value::Set(
                ints.into_iter()
                    .map(|i| Bytes::from(i.to_string().into_bytes()))
                    .collect(),
            ))
        }

        TYPE_ZSET_ZIPLIST => {
            let blob = primitives::read_string(r)?;
            let flat = ziplist::decode_all(blob, None)?;
            Ok(Value::ZSet(zset_from_flat(flat)?))
        }

        TYPE_HASH_ZIPLIST => {
            let blob = primitives::read_string(r)?;
            let flat = ziplist::decode_all(blob, None)?;
            Ok(Value::Hash(pairs_from_flat(flat)))
        }

        TYPE_LIST_QUICKLIST => {
            let n = primitives::read_plain_length(r)?;
            Ok(Value::List(quicklist::decode_v1(r, n)?))
        }

        TYPE_LIST_QUICKLIST_2 => {
            let n = primitives::read_plain_length(r)?;
            Ok(Value::List(quicklist::decode_v2(r, n)?))
        }

        TYPE_HASH_LISTPACK => {
            let blob = primitives::read_string(r)?;
            let flat = listpack::decode_all(blob, None)?;
            Ok(Value::Hash(pairs_from_flat(flat)))
        }

        TYPE_ZSET_LISTPACK => {
            let blob = primitives::read_string(r)?;
            let flat = listpack::decode_all(blob, None)?;
            Ok(Value::ZSet(zset_from_flat(flat)?))
        }

        TYPE_SET_LISTPACK => {
            let blob = primitives::read_string(r)?;
            Ok(Value::Set(listpack::decode_all(blob, None)?))
        }

        other => Err(RdbError::UnsupportedType {
            db,
            key: key.to_vec(),
            type_byte: other,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: Vec<u8>) -> ChecksummedReader<Cursor<Vec<u8>>> {
        ChecksummedReader::new(Cursor::new(bytes))
    }

    #[test]
    fn string_value() {
        let mut r = reader(vec![0x03, b'k', b'e', b'y']);
        let v = read_value(&mut r, TYPE_STRING, 0, b"k").unwrap();
        assert_eq!(v, Value::Str(Bytes::from_static(b"key")));
    }

    #[test]
    fn list_value() {
        let mut bytes = vec![2u8]; // count
        bytes.push(1);
        bytes.push(b'a');
        bytes.push(1);
        bytes.push(b'b');
        let mut r = reader(bytes);
        let v = read_value(&mut r, TYPE_LIST, 0, b"k").unwrap();
        assert_eq!(
            v,
            Value::List(vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")])
        );
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let mut r = reader(vec![]);
        let err = read_value(&mut r, TYPE_MODULE_2, 3, b"mykey").unwrap_err();
        match err {
            RdbError::UnsupportedType { db, key, type_byte } => {
                assert_eq!(db, 3);
                assert_eq!(key, b"mykey");
                assert_eq!(type_byte, TYPE_MODULE_2);
            }
            _ => panic!("expected UnsupportedType"),
        }
    }

    #[test]
    fn zset_v2_scores_roundtrip_bit_pattern() {
        let mut bytes = vec![4u8]; // count = 4
        for (member, score) in [
            (b'a', f64::NAN),
            (b'b', f64::INFINITY),
            (b'c', f64::NEG_INFINITY),
            (b'd', 3.25),
        ] {
            bytes.push(1);
            bytes.push(member);
            bytes.extend_from_slice(&score.to_le_bytes());
        }
        let mut r = reader(bytes);
        let v = read_value(&mut r, TYPE_ZSET_2, 0, b"z").unwrap();
        if let Value::ZSet(entries) = v {
            assert!(entries[0].1.is_nan());
            assert_eq!(entries[1].1, f64::INFINITY);
            assert_eq!(entries[2].1, f64::NEG_INFINITY);
            assert_eq!(entries[3].1, 3.25);
        } else {
            panic!("expected zset");
        }
    }
}
