use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::Tuning;
use crate::metainfo::Metainfo;
use crate::peer::{spawn_inbound, spawn_outbound, Bitfield, Message, PeerContext, PeerHandle, PeerId};
use crate::storage::PieceStore;

use super::stats::{TorrentState, TorrentStats};
use super::work::WorkQueue;

const ADDR_CHANNEL_CAPACITY: usize = 64;
const INCOMING_CHANNEL_CAPACITY: usize = 8;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// The registry's grip on a running coordinator.
pub(crate) struct CoordinatorHandle {
    /// Tracker-supplied peer addresses go in here.
    pub addrs: mpsc::Sender<SocketAddr>,
    /// Post-handshake inbound connections go in here.
    pub incoming: mpsc::Sender<(TcpStream, SocketAddr)>,
    /// The shared piece backlog this coordinator seeded.
    pub work: WorkQueue,
    pub cancel: CancellationToken,
    pub join: JoinHandle<()>,
}

/// Starts one torrent's coordinator task.
///
/// Seeds the work queue with the pieces missing from `have` and derives the
/// initial `left`/state from it.
pub(crate) fn spawn_coordinator(
    info: Arc<Metainfo>,
    store: Arc<dyn PieceStore>,
    stats: Arc<TorrentStats>,
    have: Arc<RwLock<Bitfield>>,
    our_id: PeerId,
    tuning: Tuning,
    max_peers: usize,
    cancel: CancellationToken,
) -> CoordinatorHandle {
    let (addr_tx, addr_rx) = mpsc::channel(ADDR_CHANNEL_CAPACITY);
    let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_CHANNEL_CAPACITY);
    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let (dead_tx, dead_rx) = mpsc::unbounded_channel();

    let bitfield = have.read().clone();
    let work = WorkQueue::new();
    let mut left = 0u64;
    for index in bitfield.missing() {
        work.push(index);
        left += u64::from(info.info.piece_size(index));
    }
    stats.set_left(left);
    stats.set_state(if bitfield.is_complete() {
        TorrentState::Seeding
    } else {
        TorrentState::Downloading
    });

    let coordinator = Coordinator {
        info,
        store,
        stats,
        have,
        our_id,
        tuning,
        max_peers,
        work: work.clone(),
        bitfield,
        peers: HashMap::new(),
        results_tx,
        dead_tx,
        cancel: cancel.clone(),
    };

    let join = tokio::spawn(coordinator.run(addr_rx, incoming_rx, results_rx, dead_rx));

    CoordinatorHandle {
        addrs: addr_tx,
        incoming: incoming_tx,
        work,
        cancel,
        join,
    }
}

struct Coordinator {
    info: Arc<Metainfo>,
    store: Arc<dyn PieceStore>,
    stats: Arc<TorrentStats>,
    have: Arc<RwLock<Bitfield>>,
    our_id: PeerId,
    tuning: Tuning,
    max_peers: usize,

    work: WorkQueue,
    /// The coordinator's authoritative copy; `have` mirrors it for readers.
    bitfield: Bitfield,
    peers: HashMap<SocketAddr, PeerHandle>,

    results_tx: mpsc::UnboundedSender<u32>,
    dead_tx: mpsc::UnboundedSender<SocketAddr>,
    cancel: CancellationToken,
}

impl Coordinator {
    async fn run(
        mut self,
        mut addr_rx: mpsc::Receiver<SocketAddr>,
        mut incoming_rx: mpsc::Receiver<(TcpStream, SocketAddr)>,
        mut results_rx: mpsc::UnboundedReceiver<u32>,
        mut dead_rx: mpsc::UnboundedReceiver<SocketAddr>,
    ) {
        info!(torrent = %self.info.info_hash, name = %self.info.info.name, "torrent started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(index) = results_rx.recv() => self.on_piece_complete(index),
                Some(addr) = dead_rx.recv() => {
                    trace!(peer = %addr, "peer removed");
                    self.peers.remove(&addr);
                }
                Some((stream, addr)) = incoming_rx.recv() => self.on_incoming(stream, addr),
                Some(addr) = addr_rx.recv() => self.on_peer_addr(addr),
            }
        }

        self.shutdown(&mut dead_rx).await;
    }

    fn peer_context(&self) -> PeerContext {
        PeerContext {
            info: self.info.clone(),
            store: self.store.clone(),
            stats: self.stats.clone(),
            have: self.have.clone(),
            work: self.work.clone(),
            results: self.results_tx.clone(),
            dead_peers: self.dead_tx.clone(),
            our_id: self.our_id,
            tuning: self.tuning,
        }
    }

    fn on_peer_addr(&mut self, addr: SocketAddr) {
        if self.peers.contains_key(&addr) || self.peers.len() >= self.max_peers {
            return;
        }
        trace!(peer = %addr, "dialing peer");
        let handle = spawn_outbound(self.peer_context(), addr, self.cancel.child_token());
        self.peers.insert(addr, handle);
    }

    fn on_incoming(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.peers.contains_key(&addr) || self.peers.len() >= self.max_peers {
            return;
        }
        trace!(peer = %addr, "accepted peer");
        let handle = spawn_inbound(self.peer_context(), stream, addr, self.cancel.child_token());
        self.peers.insert(addr, handle);
    }

    fn on_piece_complete(&mut self, index: u32) {
        if self.bitfield.has(index as usize) {
            return;
        }
        self.bitfield.set(index as usize);
        self.have.write().set(index as usize);
        self.stats
            .sub_left(u64::from(self.info.info.piece_size(index)));

        debug!(
            torrent = %self.info.info_hash,
            piece = index,
            left = self.stats.left(),
            "piece complete"
        );

        // A peer receiving this Have may immediately request the piece; the
        // bit is already set, so the store can serve it. The send channel is
        // unbounded, so a failure means the session has already exited and
        // is on its way out through `deadPeers`.
        for (addr, handle) in &self.peers {
            if handle.send.send(Message::Have { index }).is_err() {
                warn!(peer = %addr, piece = index, "peer session gone before have broadcast");
            }
        }

        if self.bitfield.is_complete() {
            info!(torrent = %self.info.info_hash, "download complete, seeding");
            self.stats.set_state(TorrentState::Seeding);
        }
    }

    /// Cancels every session and waits for them to drain off `dead_rx`.
    async fn shutdown(&mut self, dead_rx: &mut mpsc::UnboundedReceiver<SocketAddr>) {
        self.cancel.cancel();

        while !self.peers.is_empty() {
            match timeout(DRAIN_TIMEOUT, dead_rx.recv()).await {
                Ok(Some(addr)) => {
                    self.peers.remove(&addr);
                }
                _ => break,
            }
        }

        self.stats.set_state(TorrentState::Stopped);
        info!(torrent = %self.info.info_hash, "torrent stopped");
    }
}
