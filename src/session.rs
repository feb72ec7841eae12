//! The process-wide session: the registry of managed torrents, the TCP
//! acceptor for inbound peers, and the control entry points an RPC surface
//! would call (`add`, `remove`, `start`, `stop`, `list`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::metainfo::{InfoHash, Metainfo};
use crate::peer::{read_handshake, send_handshake, Bitfield, Handshake, PeerId};
use crate::resume::{self, ResumeData};
use crate::storage::{DiskStore, PieceStore, StorageError};
use crate::torrent::{spawn_coordinator, CoordinatorHandle, TorrentStats, TorrentStatus};
use crate::tracker::Announcer;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metainfo error: {0}")]
    Metainfo(#[from] crate::metainfo::MetainfoError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("torrent not found")]
    TorrentNotFound,

    #[error("torrent is already managed")]
    AlreadyManaged,
}

struct Running {
    coordinator: CoordinatorHandle,
    announcer: JoinHandle<()>,
}

struct TorrentEntry {
    info: Arc<Metainfo>,
    store: Arc<dyn PieceStore>,
    stats: Arc<TorrentStats>,
    have: Arc<RwLock<Bitfield>>,
    source: PathBuf,
    running: Option<Running>,
}

/// The process-wide registry of torrents.
///
/// Construct one at daemon start with [`Session::bind`]; it owns the listen
/// socket and routes every inbound peer connection to the torrent its
/// handshake names.
pub struct Session {
    config: Config,
    peer_id: PeerId,
    port: u16,
    torrents: Arc<DashMap<InfoHash, TorrentEntry>>,
    cancel: CancellationToken,
}

impl Session {
    /// Binds the listen socket and starts the acceptor.
    ///
    /// Walks the configured port range; when every port is taken, falls
    /// back to an OS-assigned one.
    pub async fn bind(config: Config) -> Result<Self, SessionError> {
        let peer_id = PeerId::generate();
        let listener = bind_in_range(&config).await?;
        let port = listener.local_addr()?.port();

        let torrents: Arc<DashMap<InfoHash, TorrentEntry>> = Arc::new(DashMap::new());
        let cancel = CancellationToken::new();

        tokio::spawn(accept_loop(
            listener,
            torrents.clone(),
            peer_id,
            config.tuning,
            cancel.child_token(),
        ));

        info!(port, id = ?peer_id, "session listening");
        Ok(Self {
            config,
            peer_id,
            port,
            torrents,
            cancel,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Adds a torrent from raw `.torrent` bytes, storing its data under the
    /// configured download directory. Resume state, when present, marks the
    /// already-verified pieces.
    pub async fn add(
        &self,
        torrent: &[u8],
        source: impl Into<PathBuf>,
    ) -> Result<InfoHash, SessionError> {
        let meta = Metainfo::from_bytes(torrent)?;
        let store = DiskStore::new(&meta.info, &self.config.download_dir);
        store.preallocate().await?;

        let mut have = Bitfield::new(meta.info.piece_count());
        match resume::load(&self.config.state_dir, meta.info_hash).await {
            Ok(Some(saved)) if saved.bitfield.len() == meta.info.bitfield_len() => {
                have = Bitfield::from_bytes(&saved.bitfield, meta.info.piece_count());
                debug!(torrent = %meta.info_hash, pieces = have.count(), "resumed");
            }
            Ok(_) => {}
            Err(err) => warn!(torrent = %meta.info_hash, error = %err, "ignoring resume data"),
        }

        self.insert(meta, Arc::new(store), have, source.into())
    }

    /// Adds a torrent backed by a caller-supplied piece store, with `have`
    /// naming the pieces the store already holds.
    pub fn add_with_store(
        &self,
        torrent: &[u8],
        store: Arc<dyn PieceStore>,
        have: Bitfield,
    ) -> Result<InfoHash, SessionError> {
        let meta = Metainfo::from_bytes(torrent)?;
        self.insert(meta, store, have, PathBuf::new())
    }

    fn insert(
        &self,
        meta: Metainfo,
        store: Arc<dyn PieceStore>,
        have: Bitfield,
        source: PathBuf,
    ) -> Result<InfoHash, SessionError> {
        let info_hash = meta.info_hash;
        if self.torrents.contains_key(&info_hash) {
            return Err(SessionError::AlreadyManaged);
        }

        let left: u64 = have
            .missing()
            .iter()
            .map(|&i| u64::from(meta.info.piece_size(i)))
            .sum();
        let stats = Arc::new(TorrentStats::new(left));

        self.torrents.insert(
            info_hash,
            TorrentEntry {
                info: Arc::new(meta),
                store,
                stats,
                have: Arc::new(RwLock::new(have)),
                source,
                running: None,
            },
        );
        Ok(info_hash)
    }

    /// Starts a torrent's coordinator and announcer.
    pub fn start(&self, info_hash: InfoHash) -> Result<(), SessionError> {
        let mut entry = self
            .torrents
            .get_mut(&info_hash)
            .ok_or(SessionError::TorrentNotFound)?;
        if entry.running.is_some() {
            return Ok(());
        }

        let cancel = self.cancel.child_token();
        let coordinator = spawn_coordinator(
            entry.info.clone(),
            entry.store.clone(),
            entry.stats.clone(),
            entry.have.clone(),
            self.peer_id,
            self.config.tuning,
            self.config.max_peers,
            cancel,
        );

        let announcer = Announcer::new(
            entry.info.trackers(),
            info_hash,
            self.peer_id,
            self.port,
            entry.stats.clone(),
            coordinator.addrs.clone(),
            coordinator.cancel.child_token(),
        )
        .spawn();

        entry.running = Some(Running {
            coordinator,
            announcer,
        });
        Ok(())
    }

    /// Stops a torrent: cancels its coordinator, waits for peers to drain,
    /// and writes resume state.
    pub async fn stop(&self, info_hash: InfoHash) -> Result<(), SessionError> {
        let (running, data) = {
            let mut entry = self
                .torrents
                .get_mut(&info_hash)
                .ok_or(SessionError::TorrentNotFound)?;
            let data = ResumeData {
                info_hash,
                source: entry.source.clone(),
                target_dir: self.config.download_dir.clone(),
                bitfield: entry.have.read().as_bytes().to_vec(),
                trackers: entry.info.trackers(),
            };
            (entry.running.take(), data)
        };

        let Some(running) = running else {
            return Ok(());
        };
        running.coordinator.cancel.cancel();
        let _ = running.coordinator.join.await;
        let _ = running.announcer.await;

        if let Err(err) = resume::save(&self.config.state_dir, &data).await {
            warn!(torrent = %info_hash, error = %err, "failed to save resume data");
        }
        Ok(())
    }

    /// Stops (if running) and forgets a torrent, dropping its resume state.
    pub async fn remove(&self, info_hash: InfoHash) -> Result<(), SessionError> {
        self.stop(info_hash).await?;
        self.torrents
            .remove(&info_hash)
            .ok_or(SessionError::TorrentNotFound)?;
        let _ = resume::remove(&self.config.state_dir, info_hash).await;
        Ok(())
    }

    /// A snapshot of every managed torrent.
    pub fn list(&self) -> Vec<TorrentStatus> {
        self.torrents
            .iter()
            .map(|entry| TorrentStatus {
                info_hash: *entry.key(),
                name: entry.info.info.name.clone(),
                total_length: entry.info.info.total_length,
                left: entry.stats.left(),
                state: entry.stats.state(),
                peers: entry.stats.peers(),
                downloaded: entry.stats.downloaded(),
                uploaded: entry.stats.uploaded(),
            })
            .collect()
    }

    /// Stops every torrent and the acceptor.
    pub async fn shutdown(&self) {
        let hashes: Vec<InfoHash> = self.torrents.iter().map(|e| *e.key()).collect();
        for hash in hashes {
            let _ = self.stop(hash).await;
        }
        self.cancel.cancel();
    }
}

async fn bind_in_range(config: &Config) -> Result<TcpListener, SessionError> {
    for port in config.port_range.clone() {
        match TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => return Ok(listener),
            Err(err) => debug!(port, error = %err, "port unavailable"),
        }
    }
    warn!("no open port in configured range, using an OS-assigned port");
    Ok(TcpListener::bind(("0.0.0.0", 0)).await?)
}

async fn accept_loop(
    listener: TcpListener,
    torrents: Arc<DashMap<InfoHash, TorrentEntry>>,
    peer_id: PeerId,
    tuning: crate::config::Tuning,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                let torrents = torrents.clone();
                tokio::spawn(async move {
                    if let Err(err) = route_inbound(stream, addr, torrents, peer_id, tuning).await {
                        debug!(peer = %addr, error = %err, "inbound connection dropped");
                    }
                });
            }
            Err(err) => {
                warn!(error = %err, "accept failed");
            }
        }
    }
}

/// Validates an inbound handshake and hands the socket to the torrent it
/// names. Unknown info hashes and stopped torrents just drop the socket.
async fn route_inbound(
    mut stream: TcpStream,
    addr: SocketAddr,
    torrents: Arc<DashMap<InfoHash, TorrentEntry>>,
    peer_id: PeerId,
    tuning: crate::config::Tuning,
) -> Result<(), crate::peer::PeerError> {
    let theirs = read_handshake(&mut stream, tuning.handshake_timeout).await?;
    let info_hash = InfoHash::from_bytes(theirs.info_hash);

    // Clone the channel out and release the map guard before any await.
    let incoming = match torrents.get(&info_hash) {
        Some(entry) => match &entry.running {
            Some(running) => running.coordinator.incoming.clone(),
            None => return Ok(()),
        },
        None => return Ok(()),
    };

    let ours = Handshake::new(info_hash.0, peer_id.0);
    send_handshake(&mut stream, &ours, tuning.handshake_timeout).await?;

    let _ = incoming.send((stream, addr)).await;
    Ok(())
}
