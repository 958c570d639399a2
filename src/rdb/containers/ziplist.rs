//! Ziplist: the classic compact encoding for small lists, hashes, and
//! sorted sets. Header is `(zlbytes: u32 LE, zltail: u32 LE, zllen: u16 LE)`;
//! each entry carries a previous-entry-length prefix (1 or 5 bytes) and an
//! encoding byte selecting a string or integer subform. Terminated by 0xFF.

use bytes::Bytes;

use crate::rdb::RdbError;

/// `zllen` sentinel meaning "more than fits in 16 bits, count by walking to
/// the terminator instead of trusting the header".
const ZLLEN_UNKNOWN: u16 = 0xFFFF;

pub struct ZiplistIter {
    buf: Bytes,
    pos: usize,
}

impl ZiplistIter {
    pub fn new(buf: Bytes) -> Result<Self, RdbError> {
        if buf.len() < 11 {
            return Err(RdbError::BadTerminator(0));
        }
        Ok(Self { buf, pos: 10 })
    }

    /// The header's own `zllen` field, or `None` when it's the
    /// "count unknown" sentinel.
    pub fn header_count(&self) -> Option<usize> {
        let zllen = u16::from_le_bytes([self.buf[8], self.buf[9]]);
        if zllen == ZLLEN_UNKNOWN {
            None
        } else {
            Some(zllen as usize)
        }
    }

    fn read_prevlen(&mut self) -> Result<(), RdbError> {
        let first = self.buf[self.pos];
        if first < 0xFE {
            self.pos += 1;
        } else {
            self.pos += 5;
        }
        Ok(())
    }
}

impl Iterator for ZiplistIter {
    type Item = Result<Bytes, RdbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        if self.buf[self.pos] == 0xFF {
            return None;
        }
        if let Err(e) = self.read_prevlen() {
            return Some(Err(e));
        }
        let enc = self.buf[self.pos];
        let top = enc >> 6;
        match top {
            0b00 => {
                let len = (enc & 0x3f) as usize;
                self.pos += 1;
                let val = self.buf.slice(self.pos..self.pos + len);
                self.pos += len;
                Some(Ok(val))
            }
            0b01 => {
                let len = (((enc & 0x3f) as usize) << 8) | self.buf[self.pos + 1] as usize;
                self.pos += 2;
                let val = self.buf.slice(self.pos..self.pos + len);
                self.pos += len;
                Some(Ok(val))
            }
            0b10 => {
                let len = u32::from_be_bytes([
                    self.buf[self.pos + 1],
                    self.buf[self.pos + 2],
                    self.buf[self.pos + 3],
                    self.buf[self.pos + 4],
                ]) as usize;
                self.pos += 5;
                let val = self.buf.slice(self.pos..self.pos + len);
                self.pos += len;
                Some(Ok(val))
            }
            0b11 => match enc {
                0xC0 => {
                    let v = i16::from_le_bytes([self.buf[self.pos + 1], self.buf[self.pos + 2]]);
                    self.pos += 3;
                    Some(Ok(Bytes::from(v.to_string().into_bytes())))
                }
                0xD0 => {
                    let v = i32::from_le_bytes([
                        self.buf[self.pos + 1],
                        self.buf[self.pos + 2],
                        self.buf[self.pos + 3],
                        self.buf[self.pos + 4],
                    ]);
                    self.pos += 5;
                    Some(Ok(Bytes::from(v.to_string().into_bytes())))
                }
                0xE0 => {
                    let mut b = [0u8; 8];
                    b.copy_from_slice(&self.buf[self.pos + 1..self.pos + 9]);
                    let v = i64::from_le_bytes(b);
                    self.pos += 9;
                    Some(Ok(Bytes::from(v.to_string().into_bytes())))
                }
                0xF0 => {
                    // 24-bit signed little-endian, sign-extended
                    let b0 = self.buf[self.pos + 1] as i32;
                    let b1 = self.buf[self.pos + 2] as i32;
                    let b2 = self.buf[self.pos + 3] as i32;
                    let mut v = b0 | (b1 << 8) | (b2 << 16);
                    if v & 0x0080_0000 != 0 {
                        v |= -0x0100_0000i32;
                    }
                    self.pos += 4;
                    Some(Ok(Bytes::from(v.to_string().into_bytes())))
                }
                0xFE => {
                    let v = self.buf[self.pos + 1] as i8;
                    self.pos += 2;
                    Some(Ok(Bytes::from(v.to_string().into_bytes())))
                }
                _ if (0xF1..=0xFD).contains(&enc) => {
                    let v = (enc & 0x0f) as i64 - 1;
                    self.pos += 1;
                    Some(Ok(Bytes::from(v.to_string().into_bytes())))
                }
                other => Some(Err(RdbError::BadTerminator(other))),
            },
            _ => unreachable!(),
        }
    }
}

/// Decode every element, checking the result count against the header's own
/// `zllen` field (skipped when `zllen` is the "count unknown" sentinel), and
/// additionally against `expected` when the caller has an independent count
/// to cross-check (e.g. none currently does, since ziplist is always the
/// sole, self-describing payload for its RDB type).
pub fn decode_all(buf: Bytes, expected: Option<usize>) -> Result<Vec<Bytes>, RdbError> {
    let iter = ZiplistIter::new(buf)?;
    let header_count = iter.header_count();
    let items: Result<Vec<Bytes>, RdbError> = iter.collect();
    let items = items?;
    if let Some(header_count) = header_count {
        super::check_count(header_count, items.len())?;
    }
    if let Some(expected) = expected {
        super::check_count(expected, items.len())?;
    }
    Ok(items)
}
