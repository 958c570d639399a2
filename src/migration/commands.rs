//! Building the RESP command sequence for one entry: an unconditional `DEL`
//! followed by type-specific writes, chunked so no single command carries
//! more than a few hundred arguments, then an expire command if the entry
//! carries one. `--unixtime-in-milliseconds` shifts are applied here, at the
//! point where the absolute expiry actually gets turned into a command.

use bytes::Bytes;

use crate::rdb::{Entry, Value};

/// Default Redis list/hash/set/zset commands top out well under this many
/// arguments per call; 500 keeps individual pipelined commands small enough
/// that one slow key can't stall the whole flush tick.
pub const MAX_BATCH_ITEMS: usize = 500;

/// Entries below this size are cheap enough to send with a single `RESTORE`
/// call instead of broken-down per-type commands, when `--use-restore-command`
/// is set.
pub const RESTORE_OPTIMIZATION_THRESHOLD: usize = 128 * 1024 * 1024;

fn format_score(score: f64) -> String {
    if score.is_nan() {
        "nan".to_string()
    } else if score.is_infinite() {
        if score > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else {
        score.to_string()
    }
}

fn shifted_expire(entry: &Entry, expire_shift_ms: i64) -> Option<i64> {
    entry.expire_at_ms.map(|at| at + expire_shift_ms)
}

/// Build the broken-down command sequence for one entry: `DEL`, then one or
/// more type-specific writes, then `PEXPIREAT`/`PEXPIRE` if it carries a TTL.
/// This is the default restore path (see the restore-command Open Question
/// in the design notes): no reliance on any single server command
/// understanding the exact dump-payload encoding we produced.
pub fn build_restore_commands(entry: &Entry, expire_shift_ms: i64, now_ms: i64) -> Vec<Vec<Bytes>> {
    let mut cmds = Vec::new();
    cmds.push(vec![Bytes::from_static(b"DEL"), entry.key.clone()]);

    match &entry.value {
        Value::Str(s) => {
            cmds.push(vec![Bytes::from_static(b"SET"), entry.key.clone(), s.clone()]);
        }
        Value::List(items) => {
            for chunk in items.chunks(MAX_BATCH_ITEMS) {
                let mut cmd = vec![Bytes::from_static(b"RPUSH"), entry.key.clone()];
                cmd.extend(chunk.iter().cloned());
                cmds.push(cmd);
            }
        }
        Value::Hash(pairs) => {
            for chunk in pairs.chunks(MAX_BATCH_ITEMS / 2) {
                let mut cmd = vec![Bytes::from_static(b"HMSET"), entry.key.clone()];
                for (field, value) in chunk {
                    cmd.push(field.clone());
                    cmd.push(value.clone());
                }
                cmds.push(cmd);
            }
        }
        Value::Set(members) => {
            for chunk in members.chunks(MAX_BATCH_ITEMS) {
                let mut cmd = vec![Bytes::from_static(b"SADD"), entry.key.clone()];
                cmd.extend(chunk.iter().cloned());
                cmds.push(cmd);
            }
        }
        Value::ZSet(pairs) => {
            for chunk in pairs.chunks(MAX_BATCH_ITEMS / 2) {
                let mut cmd = vec![Bytes::from_static(b"ZADD"), entry.key.clone()];
                for (member, score) in chunk {
                    cmd.push(Bytes::from(format_score(*score)));
                    cmd.push(member.clone());
                }
                cmds.push(cmd);
            }
        }
    }

    if let Some(expire_at) = shifted_expire(entry, expire_shift_ms) {
        if expire_at <= now_ms {
            // Already expired by the time it lands on the target: expire it
            // immediately rather than skip the write entirely, so a key that
            // is about to disappear on the source disappears on the target
            // too instead of lingering forever.
            cmds.push(vec![Bytes::from_static(b"PEXPIRE"), entry.key.clone(), Bytes::from_static(b"1")]);
        } else {
            cmds.push(vec![
                Bytes::from_static(b"PEXPIREAT"),
                entry.key.clone(),
                Bytes::from(expire_at.to_string()),
            ]);
        }
    }

    cmds
}

/// Build the opt-in `RESTORE`-based path: one `DEL` plus one `RESTORE ...
/// REPLACE` carrying the dump payload verbatim.
pub fn build_restore_via_dump(entry: &Entry, rdb_version: u16, expire_shift_ms: i64, now_ms: i64) -> Vec<Vec<Bytes>> {
    let payload = crate::rdb::dump::encode_dump_payload(&entry.value, rdb_version);
    let ttl_ms = match shifted_expire(entry, expire_shift_ms) {
        Some(at) => (at - now_ms).max(1),
        None => 0,
    };
    vec![
        vec![Bytes::from_static(b"DEL"), entry.key.clone()],
        vec![
            Bytes::from_static(b"RESTORE"),
            entry.key.clone(),
            Bytes::from(ttl_ms.to_string()),
            Bytes::from(payload),
            Bytes::from_static(b"REPLACE"),
        ],
    ]
}

/// Rough wire size of a value, used to decide whether the `RESTORE`
/// optimization is worth it for a given entry.
pub fn approximate_value_size(value: &Value) -> usize {
    match value {
        Value::Str(s) => s.len(),
        Value::List(items) => items.iter().map(|b| b.len()).sum(),
        Value::Set(members) => members.iter().map(|b| b.len()).sum(),
        Value::Hash(pairs) => pairs.iter().map(|(f, v)| f.len() + v.len()).sum(),
        Value::ZSet(pairs) => pairs.iter().map(|(m, _)| m.len() + 8).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(value: Value, expire_at_ms: Option<i64>) -> Entry {
        Entry {
            db: 0,
            expire_at_ms,
            key: Bytes::from_static(b"k"),
            value,
        }
    }

    #[test]
    fn string_entry_is_del_then_set() {
        let e = entry(Value::Str(Bytes::from_static(b"v")), None);
        let cmds = build_restore_commands(&e, 0, 0);
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0][0], Bytes::from_static(b"DEL"));
        assert_eq!(cmds[1][0], Bytes::from_static(b"SET"));
    }

    #[test]
    fn list_is_chunked_at_max_batch_items() {
        let items: Vec<Bytes> = (0..1200).map(|i| Bytes::from(i.to_string())).collect();
        let e = entry(Value::List(items), None);
        let cmds = build_restore_commands(&e, 0, 0);
        // DEL + 3 RPUSH chunks (500, 500, 200)
        assert_eq!(cmds.len(), 4);
        assert_eq!(cmds[1].len() - 2, 500);
        assert_eq!(cmds[3].len() - 2, 200);
    }

    #[test]
    fn future_expiry_becomes_pexpireat() {
        let e = entry(Value::Str(Bytes::from_static(b"v")), Some(5_000));
        let cmds = build_restore_commands(&e, 0, 1_000);
        let last = cmds.last().unwrap();
        assert_eq!(last[0], Bytes::from_static(b"PEXPIREAT"));
        assert_eq!(last[2], Bytes::from(b"5000".to_vec()));
    }

    #[test]
    fn past_expiry_becomes_pexpire_one() {
        let e = entry(Value::Str(Bytes::from_static(b"v")), Some(100));
        let cmds = build_restore_commands(&e, 0, 1_000);
        let last = cmds.last().unwrap();
        assert_eq!(last[0], Bytes::from_static(b"PEXPIRE"));
        assert_eq!(last[2], Bytes::from_static(b"1"));
    }

    #[test]
    fn expire_shift_applies_before_comparison() {
        let e = entry(Value::Str(Bytes::from_static(b"v")), Some(100));
        let cmds = build_restore_commands(&e, 10_000, 1_000);
        let last = cmds.last().unwrap();
        assert_eq!(last[0], Bytes::from_static(b"PEXPIREAT"));
        assert_eq!(last[2], Bytes::from(b"10100".to_vec()));
    }
}
