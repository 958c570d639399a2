//! Intset: a sorted array of fixed-width little-endian signed integers.
//! Header is `(encoding: u32 LE, length: u32 LE)`; `encoding` is the
//! per-element width in bytes (2, 4, or 8).

use bytes::Bytes;

use crate::rdb::RdbError;

pub fn decode_all(buf: Bytes) -> Result<Vec<i64>, RdbError> {
    if buf.len() < 8 {
        return Err(RdbError::BadTerminator(0));
    }
    let encoding = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let length = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    let mut out = Vec::with_capacity(length);
    let mut pos = 8;
    for _ in 0..length {
        if pos + encoding > buf.len() {
            return Err(RdbError::Truncated {
                offset: pos as u64,
                wanted: encoding,
            });
        }
        let v = match encoding {
            2 => i16::from_le_bytes([buf[pos], buf[pos + 1]]) as i64,
            4 => i32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]) as i64,
            8 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&buf[pos..pos + 8]);
                i64::from_le_bytes(b)
            }
            _ => {
                return Err(RdbError::BadLength {
                    offset: pos as u64,
                })
            }
        };
        out.push(v);
        pos += encoding;
    }
    super::check_count(length, out.len())?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(encoding: u32, values: &[i64]) -> Bytes {
        let mut buf = Vec::new();
        buf.extend_from_slice(&encoding.to_le_bytes());
        buf.extend_from_slice(&(values.len() as u32).to_le_bytes());
        for &v in values {
            match encoding {
                2 => buf.extend_from_slice(&(v as i16).to_le_bytes()),
                4 => buf.extend_from_slice(&(v as i32).to_le_bytes()),
                8 => buf.extend_from_slice(&v.to_le_bytes()),
                _ => unreachable!(),
            }
        }
        Bytes::from(buf)
    }

    #[test]
    fn decodes_16bit() {
        let buf = build(2, &[-5, 0, 1000]);
        assert_eq!(decode_all(buf).unwrap(), vec![-5, 0, 1000]);
    }

    #[test]
    fn decodes_64bit() {
        let buf = build(8, &[i64::MIN, i64::MAX]);
        assert_eq!(decode_all(buf).unwrap(), vec![i64::MIN, i64::MAX]);
    }
}
