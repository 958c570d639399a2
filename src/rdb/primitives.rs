//! RDB wire primitives: length encoding, string encoding, and double
//! encoding, read through a `ChecksummedReader` so every byte they consume
//! still folds into the running checksum.

use std::io::Read;

use bytes::Bytes;

use crate::rdb::lzf;
use crate::rdb::reader::ChecksummedReader;
use crate::rdb::RdbError;

/// Special-encoding sub-tags carried in the low 6 bits when the top two
/// bits of a length byte are `0b11`.
const ENC_INT8: u8 = 0;
const ENC_INT16: u8 = 1;
const ENC_INT32: u8 = 2;
const ENC_LZF: u8 = 3;

#[derive(Debug, PartialEq, Eq)]
pub enum Length {
    Plain(usize),
    Special(u8),
}

/// Read one length-or-special value. The top two bits of the first byte
/// select: `00` six-bit literal, `01` fourteen-bit literal (next byte
/// appended), `10` a following 32-bit (or, for the `0x81` subform, 64-bit)
/// big-endian length, `11` a special sub-tag in the low six bits.
pub fn read_length<R: Read>(r: &mut ChecksummedReader<R>) -> Result<Length, RdbError> {
    let first = r.read_u8()?;
    match first >> 6 {
        0b00 => Ok(Length::Plain((first & 0x3f) as usize)),
        0b01 => {
            let second = r.read_u8()?;
            Ok(Length::Plain((((first & 0x3f) as usize) << 8) | second as usize))
        }
        0b10 => {
            if first == 0x80 {
                Ok(Length::Plain(r.read_u32_be()? as usize))
            } else if first == 0x81 {
                Ok(Length::Plain(r.read_u64_be()? as usize))
            } else {
                Err(RdbError::BadLength {
                    offset: r.position(),
                })
            }
        }
        0b11 => Ok(Length::Special(first & 0x3f)),
        _ => unreachable!(),
    }
}

/// Encode a plain length in the same 6/14/32-bit big-endian scheme
/// `read_length` understands. Used by the dump-payload encoder, which never
/// needs to produce the special integer/LZF sub-forms.
pub fn encode_length(len: usize) -> Vec<u8> {
    if len < 1 << 6 {
        vec![len as u8]
    } else if len < 1 << 14 {
        vec![0x40 | (len >> 8) as u8, (len & 0xff) as u8]
    } else {
        let mut v = vec![0x80];
        v.extend_from_slice(&(len as u32).to_be_bytes());
        v
    }
}

pub fn encode_string(out: &mut Vec<u8>, data: &[u8]) {
    out.extend(encode_length(data.len()));
    out.extend_from_slice(data);
}

/// Read a length that must not be a special encoding.
pub fn read_plain_length<R: Read>(r: &mut ChecksummedReader<R>) -> Result<usize, RdbError> {
    match read_length(r)? {
        Length::Plain(n) => Ok(n),
        Length::Special(_) => Err(RdbError::BadLength {
            offset: r.position(),
        }),
    }
}

/// Read an RDB string in any of its three wire forms, returning raw bytes.
pub fn read_string<R: Read>(r: &mut ChecksummedReader<R>) -> Result<Bytes, RdbError> {
    match read_length(r)? {
        Length::Plain(len) => Ok(Bytes::from(r.read_vec(len)?)),
        Length::Special(ENC_INT8) => {
            let byte = r.read_u8()?;
            Ok(Bytes::from((byte as i8).to_string().into_bytes()))
        }
        Length::Special(ENC_INT16) => {
            let buf = r.read_vec(2)?;
            let v = i16::from_le_bytes([buf[0], buf[1]]);
            Ok(Bytes::from(v.to_string().into_bytes()))
        }
        Length::Special(ENC_INT32) => {
            let buf = r.read_vec(4)?;
            let v = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
            Ok(Bytes::from(v.to_string().into_bytes()))
        }
        Length::Special(ENC_LZF) => {
            let clen = read_plain_length(r)?;
            let ulen = read_plain_length(r)?;
            let compressed = r.read_vec(clen)?;
            let decompressed = lzf::decompress(&compressed, ulen)?;
            Ok(Bytes::from(decompressed))
        }
        Length::Special(_other) => Err(RdbError::BadLength {
            offset: r.position(),
        }),
    }
}

/// Read an RDB double: legacy ASCII form (one length byte, then that many
/// ASCII bytes, with 0xFD/0xFE/0xFF sentinels for NaN/+inf/-inf) or the
/// 8-byte little-endian IEEE-754 "zset v2" form, selected by the caller.
pub fn read_double_legacy<R: Read>(r: &mut ChecksummedReader<R>) -> Result<f64, RdbError> {
    let len = r.read_u8()?;
    match len {
        0xFF => Ok(f64::NEG_INFINITY),
        0xFE => Ok(f64::INFINITY),
        0xFD => Ok(f64::NAN),
        n => {
            let buf = r.read_vec(n as usize)?;
            let s = std::str::from_utf8(&buf).map_err(|_| RdbError::BadLength {
                offset: r.position(),
            })?;
            s.parse::<f64>().map_err(|_| RdbError::BadLength {
                offset: r.position(),
            })
        }
    }
}

pub fn read_double_v2<R: Read>(r: &mut ChecksummedReader<R>) -> Result<f64, RdbError> {
    let buf = r.read_vec(8)?;
    let bytes: [u8; 8] = buf.try_into().unwrap();
    Ok(f64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: Vec<u8>) -> ChecksummedReader<Cursor<Vec<u8>>> {
        ChecksummedReader::new(Cursor::new(bytes))
    }

    #[test]
    fn length_6bit_roundtrip() {
        let mut r = reader(vec![0x3f]);
        assert_eq!(read_plain_length(&mut r).unwrap(), 0x3f);
    }

    #[test]
    fn length_14bit() {
        let mut r = reader(vec![0x40 | 0x01, 0x00]); // 0x0100 = 256
        assert_eq!(read_plain_length(&mut r).unwrap(), 256);
    }

    #[test]
    fn length_32bit() {
        let mut r = reader(vec![0x80, 0x00, 0x01, 0x00, 0x00]); // 65536
        assert_eq!(read_plain_length(&mut r).unwrap(), 65536);
    }

    #[test]
    fn length_64bit() {
        let mut r = reader(vec![0x81, 0, 0, 0, 0, 0, 1, 0, 0]); // 256
        assert_eq!(read_plain_length(&mut r).unwrap(), 256);
    }

    #[test]
    fn special_encoding_subtags() {
        let mut r = reader(vec![0xC0]);
        assert_eq!(read_length(&mut r).unwrap(), Length::Special(0));
        let mut r = reader(vec![0xC3]);
        assert_eq!(read_length(&mut r).unwrap(), Length::Special(3));
    }

    #[test]
    fn raw_string() {
        let mut r = reader(vec![0x05, b'h', b'e', b'l', b'l', b'o']);
        assert_eq!(&read_string(&mut r).unwrap()[..], b"hello");
    }

    #[test]
    fn int8_string_negative() {
        let mut r = reader(vec![0xC0, 0xFE]); // -2 as i8
        assert_eq!(&read_string(&mut r).unwrap()[..], b"-2");
    }

    #[test]
    fn int16_string() {
        let mut r = reader(vec![0xC1, 0xE8, 0x03]); // 1000 LE
        assert_eq!(&read_string(&mut r).unwrap()[..], b"1000");
    }

    #[test]
    fn int32_string_boundary() {
        let v: i32 = 2147483647;
        let mut bytes = vec![0xC2];
        bytes.extend_from_slice(&v.to_le_bytes());
        let mut r = reader(bytes);
        assert_eq!(&read_string(&mut r).unwrap()[..], b"2147483647");
    }

    #[test]
    fn lzf_string() {
        // "abcabc" compressed: literal "abc", backref len=3 offset=3
        let mut bytes = vec![0xC3, 6, 6]; // special(LZF), clen=6(6bit), ulen=6(6bit)
        bytes.extend_from_slice(&[0x02, b'a', b'b', b'c', 0x20, 0x02]);
        let mut r = reader(bytes);
        assert_eq!(&read_string(&mut r).unwrap()[..], b"abcabc");
    }

    #[test]
    fn double_legacy_sentinels() {
        let mut r = reader(vec![0xFD]);
        assert!(read_double_legacy(&mut r).unwrap().is_nan());
        let mut r = reader(vec![0xFE]);
        assert_eq!(read_double_legacy(&mut r).unwrap(), f64::INFINITY);
        let mut r = reader(vec![0xFF]);
        assert_eq!(read_double_legacy(&mut r).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn double_legacy_normal() {
        let s = b"3.25";
        let mut bytes = vec![s.len() as u8];
        bytes.extend_from_slice(s);
        let mut r = reader(bytes);
        assert_eq!(read_double_legacy(&mut r).unwrap(), 3.25);
    }

    #[test]
    fn double_v2_ieee754() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3.25f64.to_le_bytes());
        let mut r = reader(bytes);
        assert_eq!(read_double_v2(&mut r).unwrap(), 3.25);
    }
}
