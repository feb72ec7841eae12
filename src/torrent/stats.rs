use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

use crate::metainfo::InfoHash;

/// A torrent's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TorrentState {
    Stopped = 0,
    Downloading = 1,
    /// All pieces verified; still serving requests.
    Seeding = 2,
}

impl TorrentState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TorrentState::Downloading,
            2 => TorrentState::Seeding,
            _ => TorrentState::Stopped,
        }
    }
}

/// Shared per-torrent counters.
///
/// The coordinator and peer sessions write these; the control surface reads
/// them without touching the coordinator's loop.
#[derive(Debug)]
pub struct TorrentStats {
    left: AtomicU64,
    downloaded: AtomicU64,
    uploaded: AtomicU64,
    peers: AtomicUsize,
    hash_failures: AtomicU64,
    state: AtomicU8,
}

impl TorrentStats {
    pub fn new(left: u64) -> Self {
        Self {
            left: AtomicU64::new(left),
            downloaded: AtomicU64::new(0),
            uploaded: AtomicU64::new(0),
            peers: AtomicUsize::new(0),
            hash_failures: AtomicU64::new(0),
            state: AtomicU8::new(TorrentState::Stopped as u8),
        }
    }

    /// Bytes still missing.
    pub fn left(&self) -> u64 {
        self.left.load(Ordering::Acquire)
    }

    pub fn set_left(&self, left: u64) {
        self.left.store(left, Ordering::Release);
    }

    pub fn sub_left(&self, bytes: u64) {
        self.left.fetch_sub(bytes, Ordering::AcqRel);
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn add_downloaded(&self, bytes: u64) {
        self.downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    pub fn add_uploaded(&self, bytes: u64) {
        self.uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn peers(&self) -> usize {
        self.peers.load(Ordering::Relaxed)
    }

    pub fn peer_connected(&self) {
        self.peers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_disconnected(&self) {
        self.peers.fetch_sub(1, Ordering::Relaxed);
    }

    /// Pieces that failed hash verification and went back to the queue.
    pub fn hash_failures(&self) -> u64 {
        self.hash_failures.load(Ordering::Relaxed)
    }

    pub fn record_hash_failure(&self) {
        self.hash_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn state(&self) -> TorrentState {
        TorrentState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: TorrentState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// A point-in-time view of one managed torrent, as listed by the control
/// surface.
#[derive(Debug, Clone)]
pub struct TorrentStatus {
    pub info_hash: InfoHash,
    pub name: String,
    pub total_length: u64,
    pub left: u64,
    pub state: TorrentState,
    pub peers: usize,
    pub downloaded: u64,
    pub uploaded: u64,
}
