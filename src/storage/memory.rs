use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::metainfo::Info;

use super::error::StorageError;
use super::store::{hash_matches, PieceStore};

/// RAM-backed piece storage, for tests and seeding from memory.
pub struct MemoryStore {
    pieces: RwLock<Vec<Option<Bytes>>>,
    hashes: Vec<[u8; 20]>,
    piece_length: u32,
    total_length: u64,
}

impl MemoryStore {
    /// Creates empty storage for `info`.
    pub fn new(info: &Info) -> Self {
        Self {
            pieces: RwLock::new(vec![None; info.piece_count()]),
            hashes: info.pieces.clone(),
            piece_length: info.piece_length,
            total_length: info.total_length,
        }
    }

    /// Creates storage already holding all of `data`, split into pieces.
    pub fn seeded(info: &Info, data: &[u8]) -> Self {
        let store = Self::new(info);
        {
            let mut pieces = store.pieces.write();
            let mut offset = 0usize;
            for (index, slot) in pieces.iter_mut().enumerate() {
                let size = store.size_of(index as u32) as usize;
                *slot = Some(Bytes::copy_from_slice(&data[offset..offset + size]));
                offset += size;
            }
        }
        store
    }

    /// Number of pieces currently held.
    pub fn piece_count(&self) -> usize {
        self.pieces.read().iter().filter(|p| p.is_some()).count()
    }

    fn size_of(&self, index: u32) -> u32 {
        let last = self.hashes.len() as u32 - 1;
        if index < last {
            self.piece_length
        } else {
            (self.total_length - u64::from(last) * u64::from(self.piece_length)) as u32
        }
    }
}

#[async_trait]
impl PieceStore for MemoryStore {
    async fn read_piece(&self, index: u32) -> Result<Bytes, StorageError> {
        let pieces = self.pieces.read();
        let slot = pieces
            .get(index as usize)
            .ok_or(StorageError::InvalidPieceIndex(index))?;
        slot.clone().ok_or(StorageError::MissingPiece(index))
    }

    async fn write_piece(&self, index: u32, data: &[u8]) -> Result<(), StorageError> {
        if index as usize >= self.hashes.len() {
            return Err(StorageError::InvalidPieceIndex(index));
        }
        let expected = self.size_of(index);
        if data.len() != expected as usize {
            return Err(StorageError::WrongPieceSize {
                index,
                expected,
                actual: data.len(),
            });
        }
        self.pieces.write()[index as usize] = Some(Bytes::copy_from_slice(data));
        Ok(())
    }

    fn verify_piece(&self, index: u32, data: &[u8]) -> bool {
        match self.hashes.get(index as usize) {
            Some(expected) => hash_matches(expected, data),
            None => false,
        }
    }
}
