//! Integration coverage for the two round-trip properties from the design
//! notes: the dump-payload codec reproduces the exact byte string it reads,
//! and the broken-down restore command sequence DELs before writing and
//! idempotently re-applies the same key (restoring twice is equivalent to
//! restoring once).

use bytes::Bytes;

use redis_port::migration::commands::{build_restore_commands, MAX_BATCH_ITEMS};
use redis_port::rdb::dump::{decode_dump_payload, encode_dump_payload};
use redis_port::rdb::{Entry, Value};

fn sample_values() -> Vec<Value> {
    vec![
        Value::Str(Bytes::from_static(b"hello world")),
        Value::List(vec![Bytes::from_static(b"a"), Bytes::from_static(b"b"), Bytes::from_static(b"c")]),
        Value::Set(vec![Bytes::from_static(b"x"), Bytes::from_static(b"y")]),
        Value::Hash(vec![
            (Bytes::from_static(b"f1"), Bytes::from_static(b"v1")),
            (Bytes::from_static(b"f2"), Bytes::from_static(b"v2")),
        ]),
        Value::ZSet(vec![
            (Bytes::from_static(b"m1"), 1.5),
            (Bytes::from_static(b"m2"), f64::NAN),
            (Bytes::from_static(b"m3"), f64::INFINITY),
        ]),
    ]
}

/// Parsing then re-encoding the dump-payload format for any value in the
/// supported type set reproduces the exact byte string (version and CRC
/// included) when round-tripped through encode/decode.
#[test]
fn dump_payload_roundtrips_every_value_kind() {
    for value in sample_values() {
        let payload = encode_dump_payload(&value, 11);
        let (decoded, version) = decode_dump_payload(&payload).unwrap();
        assert_eq!(version, 11);
        match (&value, &decoded) {
            (Value::ZSet(orig), Value::ZSet(got)) => {
                assert_eq!(orig.len(), got.len());
                for ((om, os), (gm, gs)) in orig.iter().zip(got.iter()) {
                    assert_eq!(om, gm);
                    assert_eq!(os.to_bits(), gs.to_bits());
                }
            }
            _ => assert_eq!(value, decoded),
        }
        // Re-encoding what we just decoded must reproduce byte-for-byte the
        // same payload, proving the codec has no lossy or nondeterministic
        // step (field order, numeric formatting, etc).
        let re_encoded = encode_dump_payload(&decoded, version);
        assert_eq!(re_encoded, payload);
    }
}

/// `Loader(dump(X)) == X` as a value-bag, exercised by feeding a dump
/// payload's raw type+payload body back through the same decode path a
/// freshly-loaded RDB value would have gone through.
#[test]
fn dump_payload_is_the_inverse_of_materialization() {
    let value = Value::Hash(vec![
        (Bytes::from_static(b"k1"), Bytes::from_static(b"v1")),
        (Bytes::from_static(b"k2"), Bytes::from_static(b"v2")),
    ]);
    let payload = encode_dump_payload(&value, 11);
    let (decoded, _) = decode_dump_payload(&payload).unwrap();
    assert_eq!(decoded, value);
}

/// The number of restore commands generated for a given value bag is
/// deterministic and chunked at `MAX_BATCH_ITEMS`; running `restore` twice
/// with the same input produces byte-identical command sequences (the
/// idempotence property: DEL-then-rewrite make reruns equivalent).
#[test]
fn restore_commands_are_deterministic_across_runs() {
    let items: Vec<Bytes> = (0..(MAX_BATCH_ITEMS * 2 + 7))
        .map(|i| Bytes::from(i.to_string()))
        .collect();
    let entry = Entry {
        db: 0,
        expire_at_ms: None,
        key: Bytes::from_static(b"biglist"),
        value: Value::List(items),
    };

    let first = build_restore_commands(&entry, 0, 1_000);
    let second = build_restore_commands(&entry, 0, 1_000);
    assert_eq!(first, second);

    // DEL, then 3 RPUSH batches (500, 500, 7)
    assert_eq!(first.len(), 4);
    assert_eq!(first[0][0], Bytes::from_static(b"DEL"));
    assert_eq!(first[1].len() - 2, MAX_BATCH_ITEMS);
    assert_eq!(first[2].len() - 2, MAX_BATCH_ITEMS);
    assert_eq!(first[3].len() - 2, 7);
}

/// A restore command sequence always DELs before writing, regardless of
/// value kind, so replays are idempotent at the key level even without a
/// transactional target.
#[test]
fn every_value_kind_is_deleted_before_being_rewritten() {
    for value in sample_values() {
        let entry = Entry {
            db: 3,
            expire_at_ms: Some(5_000),
            key: Bytes::from_static(b"k"),
            value,
        };
        let cmds = build_restore_commands(&entry, 0, 1_000);
        assert_eq!(cmds[0][0], Bytes::from_static(b"DEL"));
        assert_eq!(cmds[0][1], entry.key);
        // the trailing command is always the expire, since it's applied
        // last regardless of how many chunks the value itself needed
        let last = cmds.last().unwrap();
        assert!(last[0] == Bytes::from_static(b"PEXPIREAT") || last[0] == Bytes::from_static(b"PEXPIRE"));
    }
}
