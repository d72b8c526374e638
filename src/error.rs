//! Error types surfaced across the crate boundary.
//!
//! Per the data structure's error model, only deserialization can fail —
//! every query and mutation either succeeds or is a documented no-op.

use thiserror::Error;

/// Failure modes for [`crate::VebSet::deserialize`].
///
/// Each variant carries the byte offset into the input buffer where the
/// problem was detected, so a caller debugging a corrupt snapshot doesn't
/// have to re-walk the format by hand.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DeserializeError {
    /// The 9-byte `vebbitset` magic did not match at the start of the buffer.
    #[error("bad magic at offset {offset}")]
    BadMagic {
        /// Offset of the first mismatching byte.
        offset: usize,
    },
    /// The encoding-version byte is not one this crate understands.
    #[error("unsupported encoding version {found} at offset {offset}")]
    BadVersion {
        /// The version byte actually read.
        found: u8,
        /// Offset of the version byte.
        offset: usize,
    },
    /// The variant tag byte did not match any known node level.
    #[error("unsupported node tag {tag} at offset {offset}")]
    UnsupportedTag {
        /// The tag byte actually read.
        tag: u8,
        /// Offset of the tag byte.
        offset: usize,
    },
    /// The buffer ended before the format said it should.
    #[error("buffer too short: needed at least {needed} bytes, had {available}")]
    ShortBuffer {
        /// Minimum number of bytes the format required at this point.
        needed: usize,
        /// Number of bytes actually available.
        available: usize,
    },
}
