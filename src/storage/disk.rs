use std::io::SeekFrom;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::metainfo::Info;

use super::error::StorageError;
use super::store::{hash_matches, PieceStore};

/// A contiguous region of one file that a piece maps onto.
struct FileSpan {
    path: PathBuf,
    offset: u64,
    length: u64,
}

/// File-backed piece storage.
///
/// Pieces are addressed by their byte offset in the torrent's concatenated
/// data and may span multiple files; each operation walks the overlapping
/// file regions in layout order.
pub struct DiskStore {
    files: Vec<(PathBuf, u64, u64)>, // (absolute path, torrent offset, length)
    pieces: Vec<[u8; 20]>,
    piece_length: u32,
    total_length: u64,
}

impl DiskStore {
    /// Creates storage for `info` rooted at `base_path`.
    pub fn new(info: &Info, base_path: impl Into<PathBuf>) -> Self {
        let base = base_path.into();
        let files = info
            .files
            .iter()
            .map(|f| (base.join(&f.path), f.offset, f.length))
            .collect();
        Self {
            files,
            pieces: info.pieces.clone(),
            piece_length: info.piece_length,
            total_length: info.total_length,
        }
    }

    /// Creates every file at its final length so writes can land anywhere.
    pub async fn preallocate(&self) -> Result<(), StorageError> {
        for (path, _, length) in &self.files {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(path)
                .await?;
            file.set_len(*length).await?;
        }
        Ok(())
    }

    fn piece_size(&self, index: u32) -> Result<u32, StorageError> {
        if index as usize >= self.pieces.len() {
            return Err(StorageError::InvalidPieceIndex(index));
        }
        let last = self.pieces.len() as u32 - 1;
        Ok(if index < last {
            self.piece_length
        } else {
            (self.total_length - u64::from(last) * u64::from(self.piece_length)) as u32
        })
    }

    /// The file regions piece `index` overlaps, in layout order.
    fn spans(&self, index: u32) -> Result<Vec<FileSpan>, StorageError> {
        let size = u64::from(self.piece_size(index)?);
        let start = u64::from(index) * u64::from(self.piece_length);

        let mut spans = Vec::new();
        let mut cursor = start;
        let mut remaining = size;

        for (path, offset, length) in &self.files {
            if remaining == 0 {
                break;
            }
            let end = offset + length;
            if cursor >= *offset && cursor < end {
                let take = remaining.min(end - cursor);
                spans.push(FileSpan {
                    path: path.clone(),
                    offset: cursor - offset,
                    length: take,
                });
                cursor += take;
                remaining -= take;
            }
        }

        Ok(spans)
    }
}

#[async_trait]
impl PieceStore for DiskStore {
    async fn read_piece(&self, index: u32) -> Result<Bytes, StorageError> {
        let size = self.piece_size(index)? as usize;
        let mut data = Vec::with_capacity(size);

        for span in self.spans(index)? {
            let mut file = File::open(&span.path).await?;
            file.seek(SeekFrom::Start(span.offset)).await?;
            let mut buf = vec![0u8; span.length as usize];
            file.read_exact(&mut buf).await?;
            data.extend_from_slice(&buf);
        }

        Ok(Bytes::from(data))
    }

    async fn write_piece(&self, index: u32, data: &[u8]) -> Result<(), StorageError> {
        let expected = self.piece_size(index)?;
        if data.len() != expected as usize {
            return Err(StorageError::WrongPieceSize {
                index,
                expected,
                actual: data.len(),
            });
        }

        let mut written = 0usize;
        for span in self.spans(index)? {
            if let Some(parent) = span.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&span.path)
                .await?;
            file.seek(SeekFrom::Start(span.offset)).await?;
            file.write_all(&data[written..written + span.length as usize])
                .await?;
            file.sync_data().await?;
            written += span.length as usize;
        }

        Ok(())
    }

    fn verify_piece(&self, index: u32, data: &[u8]) -> bool {
        match self.pieces.get(index as usize) {
            Some(expected) => hash_matches(expected, data),
            None => false,
        }
    }
}
