use super::*;
use crate::metainfo::{File, Info};
use sha1::{Digest, Sha1};
use std::path::PathBuf;
use tempfile::TempDir;

fn sha1_of(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// An Info over `data` with the given piece length and file split points.
fn make_info(piece_length: u32, data: &[u8], file_lengths: &[u64]) -> Info {
    assert_eq!(file_lengths.iter().sum::<u64>(), data.len() as u64);

    let pieces = data.chunks(piece_length as usize).map(sha1_of).collect();
    let mut files = Vec::new();
    let mut offset = 0u64;
    for (i, &length) in file_lengths.iter().enumerate() {
        files.push(File {
            path: PathBuf::from(format!("file{}.dat", i)),
            length,
            offset,
        });
        offset += length;
    }

    Info {
        name: "test".into(),
        piece_length,
        pieces,
        files,
        total_length: data.len() as u64,
    }
}

#[tokio::test]
async fn test_disk_write_read_round_trip() {
    let temp = TempDir::new().unwrap();
    let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
    let info = make_info(16384, &data, &[40_000]);
    let store = DiskStore::new(&info, temp.path());
    store.preallocate().await.unwrap();

    for index in 0..info.piece_count() as u32 {
        let size = info.piece_size(index) as usize;
        let offset = index as usize * 16384;
        store
            .write_piece(index, &data[offset..offset + size])
            .await
            .unwrap();
    }

    for index in 0..info.piece_count() as u32 {
        let size = info.piece_size(index) as usize;
        let offset = index as usize * 16384;
        let piece = store.read_piece(index).await.unwrap();
        assert_eq!(piece.as_ref(), &data[offset..offset + size]);
        assert!(store.verify_piece(index, &piece));
    }
}

#[tokio::test]
async fn test_disk_piece_spanning_files() {
    let temp = TempDir::new().unwrap();
    let data: Vec<u8> = (0..50_000u32).map(|i| (i % 253) as u8).collect();
    // Pieces of 16 KiB against files of 10 KB: every piece crosses a file
    // boundary somewhere.
    let info = make_info(16384, &data, &[10_000, 10_000, 10_000, 20_000]);
    let store = DiskStore::new(&info, temp.path());
    store.preallocate().await.unwrap();

    for index in 0..info.piece_count() as u32 {
        let size = info.piece_size(index) as usize;
        let offset = index as usize * 16384;
        store
            .write_piece(index, &data[offset..offset + size])
            .await
            .unwrap();
    }

    let piece = store.read_piece(0).await.unwrap();
    assert_eq!(piece.as_ref(), &data[..16384]);
    assert!(store.verify_piece(0, &piece));

    // The files themselves hold the right slices.
    let file1 = tokio::fs::read(temp.path().join("file1.dat")).await.unwrap();
    assert_eq!(file1.as_slice(), &data[10_000..20_000]);
}

#[tokio::test]
async fn test_disk_rejects_wrong_piece_size() {
    let temp = TempDir::new().unwrap();
    let data = vec![1u8; 20_000];
    let info = make_info(16384, &data, &[20_000]);
    let store = DiskStore::new(&info, temp.path());

    let result = store.write_piece(0, &[0u8; 100]).await;
    assert!(matches!(result, Err(StorageError::WrongPieceSize { .. })));

    let result = store.write_piece(9, &[0u8; 16384]).await;
    assert!(matches!(result, Err(StorageError::InvalidPieceIndex(9))));
}

#[tokio::test]
async fn test_disk_verify_rejects_corruption() {
    let temp = TempDir::new().unwrap();
    let data = vec![7u8; 16384];
    let info = make_info(16384, &data, &[16384]);
    let store = DiskStore::new(&info, temp.path());

    assert!(store.verify_piece(0, &data));
    let mut corrupt = data.clone();
    corrupt[100] ^= 0xFF;
    assert!(!store.verify_piece(0, &corrupt));
    assert!(!store.verify_piece(1, &data));
}

#[tokio::test]
async fn test_memory_store_round_trip() {
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 241) as u8).collect();
    let info = make_info(4096, &data, &[10_000]);

    let store = MemoryStore::new(&info);
    assert_eq!(store.piece_count(), 0);
    assert!(matches!(
        store.read_piece(0).await,
        Err(StorageError::MissingPiece(0))
    ));

    store.write_piece(0, &data[..4096]).await.unwrap();
    assert_eq!(store.read_piece(0).await.unwrap().as_ref(), &data[..4096]);
    assert_eq!(store.piece_count(), 1);
}

#[tokio::test]
async fn test_memory_store_seeded() {
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 239) as u8).collect();
    let info = make_info(4096, &data, &[10_000]);

    let store = MemoryStore::seeded(&info, &data);
    assert_eq!(store.piece_count(), info.piece_count());

    // Last piece is the 10000 - 2*4096 = 1808 byte remainder.
    let last = store.read_piece(2).await.unwrap();
    assert_eq!(last.len(), 1808);
    assert_eq!(last.as_ref(), &data[8192..]);
    assert!(store.verify_piece(2, &last));
}
