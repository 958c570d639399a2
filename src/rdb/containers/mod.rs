//! Decoders for RDB's compact container encodings. Each decoder walks an
//! owned `Bytes` buffer (the blob already produced by
//! `rdb::primitives::read_string`, so no extra copy is taken) and yields a
//! lazy sequence of elements, validating the element count its own header
//! declares against what it actually produces.

pub mod intset;
pub mod listpack;
pub mod quicklist;
pub mod ziplist;
pub mod zipmap;

use crate::rdb::RdbError;

/// Shared "did the header's count match what we yielded" check used by
/// every container decoder.
pub fn check_count(expected: usize, actual: usize) -> Result<(), RdbError> {
    if expected != actual {
        Err(RdbError::ContainerCountMismatch { expected, actual })
    } else {
        Ok(())
    }
}
