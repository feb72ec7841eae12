use thiserror::Error;

/// Errors produced while decoding bencode data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BencodeError {
    /// The input ended in the middle of a value.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A byte that cannot start or continue a value at this position.
    #[error("unexpected byte {0:#04x}")]
    UnexpectedByte(u8),

    /// A malformed integer (empty, leading zeros, or not a number).
    #[error("invalid integer")]
    InvalidInteger,

    /// A malformed byte-string length prefix.
    #[error("invalid string length")]
    InvalidLength,

    /// A dictionary key that is not a byte string, or keys out of order.
    #[error("invalid dictionary key")]
    InvalidKey,

    /// Nesting deeper than the decoder is willing to follow.
    #[error("nesting too deep")]
    TooDeep,

    /// Bytes left over after the outermost value.
    #[error("trailing data after value")]
    TrailingData,
}
