//! Checksummed, position-tracking reader wrapping any `std::io::Read`: a
//! file, a `TcpStream`, or the read half of a spill pipe.

use std::io::{self, Read};

use crate::rdb::crc64::Digest;
use crate::rdb::RdbError;

pub struct ChecksummedReader<R> {
    inner: R,
    position: u64,
    digest: Digest,
}

impl<R: Read> ChecksummedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            position: 0,
            digest: Digest::new(),
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn checksum(&self) -> u64 {
        self.digest.finalize()
    }

    /// Read exactly `buf.len()` bytes, folding them into the running
    /// checksum. A short read is always fatal.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), RdbError> {
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                RdbError::Truncated {
                    offset: self.position,
                    wanted: buf.len(),
                }
            } else {
                RdbError::Io(e)
            }
        })?;
        self.digest.update(buf);
        self.position += buf.len() as u64;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, RdbError> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16, RdbError> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, RdbError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_u64_be(&mut self) -> Result<u64, RdbError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, RdbError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, RdbError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>, RdbError> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read-and-discard `n` bytes so the checksum stays correct for opcodes
    /// the loader otherwise ignores (`AUX`, `RESIZEDB`).
    pub fn skip(&mut self, n: usize) -> Result<(), RdbError> {
        let mut remaining = n;
        let mut scratch = [0u8; 4096];
        while remaining > 0 {
            let chunk = remaining.min(scratch.len());
            self.read_exact(&mut scratch[..chunk])?;
            remaining -= chunk;
        }
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn tracks_position() {
        let mut r = ChecksummedReader::new(Cursor::new(vec![1, 2, 3, 4]));
        r.read_u8().unwrap();
        r.read_u16_be().unwrap();
        assert_eq!(r.position(), 3);
    }

    #[test]
    fn checksum_matches_crc64_of_consumed_bytes() {
        let data = b"123456789".to_vec();
        let mut r = ChecksummedReader::new(Cursor::new(data.clone()));
        r.read_vec(data.len()).unwrap();
        assert_eq!(r.checksum(), crate::rdb::crc64::crc64(&data));
    }

    #[test]
    fn short_read_is_truncated_error() {
        let mut r = ChecksummedReader::new(Cursor::new(vec![1u8]));
        let err = r.read_u16_be().unwrap_err();
        assert!(matches!(err, RdbError::Truncated { .. }));
    }

    #[test]
    fn skip_still_folds_into_checksum() {
        let data = vec![0xAAu8; 16];
        let mut r = ChecksummedReader::new(Cursor::new(data.clone()));
        r.skip(16).unwrap();
        assert_eq!(r.checksum(), crate::rdb::crc64::crc64(&data));
    }
}
