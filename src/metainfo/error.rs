use thiserror::Error;

/// Errors from parsing torrent metainfo.
#[derive(Debug, Error)]
pub enum MetainfoError {
    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    /// The `pieces` string is not a multiple of 20 bytes.
    #[error("piece hash string has invalid length")]
    InvalidPieceHashes,

    /// Piece geometry and total length disagree.
    #[error("piece count does not match total length")]
    InvalidGeometry,
}
