use async_trait::async_trait;
use bytes::Bytes;

use super::error::StorageError;

/// The contract peer sessions use to read, write, and verify pieces.
///
/// Implementations must tolerate concurrent reads from different sessions;
/// writes arrive one whole verified piece at a time.
#[async_trait]
pub trait PieceStore: Send + Sync {
    /// Reads a whole piece.
    async fn read_piece(&self, index: u32) -> Result<Bytes, StorageError>;

    /// Durably writes a whole piece.
    async fn write_piece(&self, index: u32, data: &[u8]) -> Result<(), StorageError>;

    /// Checks an assembled piece against its expected SHA-1.
    fn verify_piece(&self, index: u32, data: &[u8]) -> bool;
}

/// SHA-1 comparison shared by the store implementations.
pub(crate) fn hash_matches(expected: &[u8; 20], data: &[u8]) -> bool {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(data);
    let digest: [u8; 20] = hasher.finalize().into();
    digest == *expected
}
