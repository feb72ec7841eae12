//! krill - a BitTorrent client engine
//!
//! This library implements the core of a BEP-3 BitTorrent client: it parses
//! torrent metainfo, discovers peers through HTTP and UDP trackers, runs a
//! peer wire session per connection with adaptive request pipelining, and
//! assembles, verifies, and stores pieces. Multiple torrents run
//! concurrently inside one [`Session`].
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 bencode encoding/decoding
//! - [`metainfo`] - Torrent file parsing and info hashes
//! - [`peer`] - Peer wire protocol and per-peer sessions
//! - [`torrent`] - Per-torrent coordination: work queue, bitfield, stats
//! - [`tracker`] - HTTP and UDP tracker clients and the announce loop
//! - [`storage`] - Piece storage: on disk or in memory
//! - [`resume`] - On-disk resume state
//! - [`session`] - Process-wide registry and control surface

pub mod bencode;
pub mod config;
pub mod constants;
pub mod metainfo;
pub mod peer;
pub mod resume;
pub mod session;
pub mod storage;
pub mod torrent;
pub mod tracker;

pub use bencode::{decode, BencodeError, Value};
pub use config::{Config, Tuning};
pub use metainfo::{Info, InfoHash, Metainfo, MetainfoError};
pub use peer::{Bitfield, Handshake, Message, PeerError, PeerId};
pub use session::{Session, SessionError};
pub use storage::{DiskStore, MemoryStore, PieceStore, StorageError};
pub use torrent::{TorrentState, TorrentStats, TorrentStatus, WorkQueue};
pub use tracker::{AnnounceResponse, HttpTracker, TrackerError, TrackerEvent, UdpTracker};
