use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid piece index: {0}")]
    InvalidPieceIndex(u32),

    /// A read of a piece that has not been written.
    #[error("piece {0} not present")]
    MissingPiece(u32),

    /// A write whose length disagrees with the piece size.
    #[error("piece {index} has size {expected}, got {actual} bytes")]
    WrongPieceSize {
        index: u32,
        expected: u32,
        actual: usize,
    },
}
