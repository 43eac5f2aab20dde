//! Structured errors for the codec and persistence layers.
//!
//! The core never panics on I/O: every fallible operation that touches a
//! file or a byte buffer returns a `Result<_, VoxelError>`. Only
//! programming-error contract violations (out-of-range coordinates, double
//! sector removal, mutating a locked pipeline stage) use assertions/panics,
//! since those are caller bugs rather than recoverable conditions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoxelError {
    #[error("bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("unsupported version: {found} (max supported {max_supported})")]
    UnsupportedVersion { found: u16, max_supported: u16 },

    #[error("truncated input: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("decoder inconsistency: {0}")]
    DecoderInconsistency(String),

    #[error("key not found")]
    NotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type VoxelResult<T> = Result<T, VoxelError>;
