//! Decode error taxonomy for the BSATN codec.

use thiserror::Error;

/// An error produced while decoding a BSATN buffer.
///
/// Decode failures are fatal for the buffer being decoded: byte boundaries
/// in a binary stream cannot be resynchronized, so callers must drop the
/// affected buffer rather than attempt partial recovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The input ended before the value was fully read.
    #[error("buffer too short for {context}: need {needed} more bytes, {remaining} remain")]
    Truncated {
        /// What was being decoded when the input ran out.
        context: &'static str,
        /// Bytes required to finish the read.
        needed: usize,
        /// Bytes actually remaining in the input.
        remaining: usize,
    },

    /// A sum value carried a tag outside the declared variant range.
    #[error("sum tag {tag} out of range ({variants} variants declared)")]
    InvalidTag {
        /// The tag byte read from the input.
        tag: u8,
        /// Number of variants the sum type declares.
        variants: usize,
    },

    /// A string field was not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// A bool byte was neither 0 nor 1.
    #[error("byte {0:#04x} is not a valid bool (must be 0 or 1)")]
    InvalidBool(u8),

    /// An optional's tag byte was neither 0 (absent) nor 1 (present).
    #[error("byte {0:#04x} is not a valid optional tag (must be 0 or 1)")]
    InvalidOptionTag(u8),

    /// A complete-value decode left unconsumed bytes in the buffer.
    #[error("{remaining} trailing bytes after decoding a complete value")]
    TrailingBytes {
        /// Bytes left unconsumed.
        remaining: usize,
    },
}
