use thiserror::Error;

/// Errors that can occur during peer communication.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent an invalid handshake.
    #[error("invalid handshake")]
    InvalidHandshake,

    /// The peer's info hash doesn't match ours.
    #[error("info hash mismatch")]
    InfoHashMismatch,

    /// A message whose payload disagrees with its tag's required size.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    /// A message ID this implementation does not know; ignored by sessions.
    #[error("unknown message id: {0}")]
    UnknownMessageId(u8),

    /// A Piece block whose bounds fall outside its piece.
    #[error("block out of bounds: piece {index}, begin {begin}")]
    BadBlock { index: u32, begin: u32 },

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// A read, write, or keep-alive deadline expired.
    #[error("timeout")]
    Timeout,

    /// Piece store failure while serving a request.
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}
