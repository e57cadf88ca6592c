//! Error types for volume decoding and reorientation.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All failures a decode call can surface.
///
/// Every variant is terminal for the call that produced it: there is no
/// internal retry and no partial result. Callers are expected to surface the
/// message verbatim.
#[derive(Debug, Error)]
pub enum Error {
    /// The filename suffix does not select any supported decode path.
    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),

    /// The fixed 348-byte header is malformed.
    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    /// The post-header extension chain is malformed.
    #[error("corrupt extension: {0}")]
    CorruptExtension(String),

    /// The header's datatype code has no supported element encoding.
    #[error("unsupported data type code: {0}")]
    UnsupportedDatatype(i16),

    /// An index filter for dimensions 3-7 failed validation.
    #[error("invalid {name}: {reason}")]
    InvalidIndex {
        /// Name of the offending filter parameter.
        name: &'static str,
        /// Why the filter was rejected, including the valid range.
        reason: String,
    },

    /// A read or seek went past the end of the buffer.
    #[error("read of {requested} bytes at offset {offset} exceeds buffer of {len} bytes")]
    OutOfBounds {
        /// Byte offset the access started at.
        offset: usize,
        /// Number of bytes requested.
        requested: usize,
        /// Total buffer length.
        len: usize,
    },

    /// An array helper was handed incompatible shapes or axis orders.
    #[error("array shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Underlying file I/O failed (file-loading layer only).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Gzip decompression failed (file-loading layer only).
    #[error("decompression failed: {0}")]
    Decompression(String),
}
