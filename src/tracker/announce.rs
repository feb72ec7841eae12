use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metainfo::InfoHash;
use crate::peer::PeerId;
use crate::torrent::{TorrentState, TorrentStats};

use super::error::TrackerError;
use super::http::{AnnounceRequest, HttpTracker};
use super::response::{AnnounceResponse, TrackerEvent};
use super::udp::UdpTracker;

/// Re-announce interval used while no tracker answers.
const RETRY_INTERVAL: Duration = Duration::from_secs(60);
/// Ceiling for the best-effort `stopped` announce on shutdown.
const STOP_ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(5);

/// The per-torrent announce task.
///
/// Shuffles the flattened tracker list once, then on every cycle walks it
/// until a tracker answers, pushes the returned peers to the coordinator,
/// and sleeps for the returned interval. A torrent with no working tracker
/// just produces an empty peer stream.
pub struct Announcer {
    trackers: Vec<String>,
    info_hash: InfoHash,
    peer_id: PeerId,
    port: u16,
    stats: Arc<TorrentStats>,
    addrs: mpsc::Sender<SocketAddr>,
    cancel: CancellationToken,
}

impl Announcer {
    pub fn new(
        mut trackers: Vec<String>,
        info_hash: InfoHash,
        peer_id: PeerId,
        port: u16,
        stats: Arc<TorrentStats>,
        addrs: mpsc::Sender<SocketAddr>,
        cancel: CancellationToken,
    ) -> Self {
        trackers.shuffle(&mut rand::rng());
        Self {
            trackers,
            info_hash,
            peer_id,
            port,
            stats,
            addrs,
            cancel,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut event = TrackerEvent::Started;
        let mut completed_sent = self.stats.state() == TorrentState::Seeding;

        loop {
            let interval = match self.announce_any(event).await {
                Some(response) => {
                    event = TrackerEvent::None;
                    for addr in &response.peers {
                        if self.addrs.send(*addr).await.is_err() {
                            return;
                        }
                    }
                    Duration::from_secs(u64::from(response.interval.max(1)))
                }
                None => RETRY_INTERVAL,
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(interval) => {}
            }

            if !completed_sent && self.stats.state() == TorrentState::Seeding {
                event = TrackerEvent::Completed;
                completed_sent = true;
            }
        }

        // Best-effort goodbye so the swarm forgets us quickly.
        let _ = timeout(
            STOP_ANNOUNCE_TIMEOUT,
            self.announce_any(TrackerEvent::Stopped),
        )
        .await;
    }

    /// Walks the tracker list until one answers.
    async fn announce_any(&self, event: TrackerEvent) -> Option<AnnounceResponse> {
        let request = AnnounceRequest {
            info_hash: self.info_hash,
            peer_id: self.peer_id,
            port: self.port,
            uploaded: self.stats.uploaded(),
            downloaded: self.stats.downloaded(),
            left: self.stats.left(),
            event,
        };

        for url in &self.trackers {
            match announce_one(url, &request).await {
                Ok(response) => {
                    debug!(
                        tracker = %url,
                        peers = response.peers.len(),
                        interval = response.interval,
                        "announce ok"
                    );
                    return Some(response);
                }
                Err(err) => {
                    warn!(tracker = %url, error = %err, "announce failed");
                }
            }
        }
        None
    }
}

async fn announce_one(
    url: &str,
    request: &AnnounceRequest,
) -> Result<AnnounceResponse, TrackerError> {
    if url.starts_with("udp://") {
        UdpTracker::connect(url).await?.announce(request).await
    } else {
        HttpTracker::new(url)?.announce(request).await
    }
}
