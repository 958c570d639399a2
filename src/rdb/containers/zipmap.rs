//! Zipmap: the legacy (pre-ziplist) compact hash encoding, only found in
//! very old dumps. A one-byte header gives the element count (`0xFE` means
//! "too many to fit in a byte, count by walking"), then key/value pairs
//! each carrying their own length prefix and a one-byte "free space" hint
//! for in-place value updates, terminated by `0xFF`.

use bytes::Bytes;

use crate::rdb::RdbError;

const LEN_UNKNOWN: u8 = 0xFE;
const TERMINATOR: u8 = 0xFF;

fn read_zm_len(buf: &Bytes, pos: &mut usize) -> Result<usize, RdbError> {
    let b = buf[*pos];
    if b < 253 {
        *pos += 1;
        Ok(b as usize)
    } else if b == 253 {
        let len = u32::from_be_bytes([buf[*pos + 1], buf[*pos + 2], buf[*pos + 3], buf[*pos + 4]]);
        *pos += 5;
        Ok(len as usize)
    } else {
        Err(RdbError::BadLength { offset: *pos as u64 })
    }
}

pub fn decode_all(buf: Bytes, expected: Option<usize>) -> Result<Vec<(Bytes, Bytes)>, RdbError> {
    if buf.is_empty() {
        return Err(RdbError::BadTerminator(0));
    }
    let header = buf[0];
    let mut pos = 1;
    let mut out = Vec::new();
    loop {
        if pos >= buf.len() {
            return Err(RdbError::Truncated {
                offset: pos as u64,
                wanted: 1,
            });
        }
        if buf[pos] == TERMINATOR {
            break;
        }
        let key_len = read_zm_len(&buf, &mut pos)?;
        let key = buf.slice(pos..pos + key_len);
        pos += key_len;

        let val_len = read_zm_len(&buf, &mut pos)?;
        let free = buf[pos] as usize;
        pos += 1;
        let value = buf.slice(pos..pos + val_len);
        pos += val_len + free;

        out.push((key, value));
    }
    if header != LEN_UNKNOWN {
        if let Some(expected) = expected {
            super::check_count(expected, out.len())?;
        } else {
            super::check_count(header as usize, out.len())?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(pairs: &[(&[u8], &[u8])]) -> Bytes {
        let mut buf = vec![pairs.len() as u8];
        for (k, v) in pairs {
            buf.push(k.len() as u8);
            buf.extend_from_slice(k);
            buf.push(v.len() as u8);
            buf.push(0); // no free space
            buf.extend_from_slice(v);
        }
        buf.push(0xFF);
        Bytes::from(buf)
    }

    #[test]
    fn decodes_pairs() {
        let buf = build(&[(b"a", b"1"), (b"bb", b"22")]);
        let pairs = decode_all(buf, None).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, Bytes::from_static(b"a"));
        assert_eq!(pairs[1].1, Bytes::from_static(b"22"));
    }
}
