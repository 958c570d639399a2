//! RDB snapshot parsing: checksummed reader, wire primitives, container
//! decoders, the typed object materializer, the dump-payload codec, and the
//! opcode-driven loader driver that ties them together.

pub mod containers;
pub mod crc64;
pub mod dump;
pub mod entry;
pub mod loader;
pub mod lzf;
pub mod opcodes;
pub mod primitives;
pub mod reader;
pub mod value;

pub use entry::{Entry, LoadMessage};
pub use loader::Loader;
pub use value::Value;

/// Errors a corrupt or unsupported RDB stream can produce. Every variant
/// carries enough context (db, key, offset) to print the one-line diagnostic
/// the tool promises on a fatal load.
#[derive(Debug, thiserror::Error)]
pub enum RdbError {
    #[error("truncated RDB stream at offset {offset} (wanted {wanted} more bytes)")]
    Truncated { offset: u64, wanted: usize },

    #[error("bad magic header: expected \"REDIS\", got {0:?}")]
    BadMagic(Vec<u8>),

    #[error("unsupported RDB version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: u64 },

    #[error("bad length encoding at offset {offset}")]
    BadLength { offset: u64 },

    #[error("LZF decompression failed: {reason}")]
    BadLzf { reason: String },

    #[error("container element count mismatch: header said {expected}, got {actual}")]
    ContainerCountMismatch { expected: usize, actual: usize },

    #[error("bad ziplist/listpack terminator byte 0x{0:02x}")]
    BadTerminator(u8),

    #[error("unsupported type byte {type_byte} for key {key:?} in db {db}")]
    UnsupportedType {
        db: u64,
        key: Vec<u8>,
        type_byte: u8,
    },

    #[error("CRC64 mismatch: stored {stored:016x}, computed {computed:016x}")]
    ChecksumMismatch { stored: u64, computed: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RdbError {
    pub fn is_fatal(&self) -> bool {
        true
    }
}
