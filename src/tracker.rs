//! Tracker protocols (BEP-3 HTTP, BEP-15 UDP).
//!
//! Trackers are how the engine discovers peers: it "announces" itself and
//! receives a list of `(host, port)` pairs plus a re-announce interval.
//! The [`Announcer`] task walks a torrent's shuffled tracker list, feeds
//! discovered addresses to the coordinator, and reports progress events
//! (`started`, `completed`, `stopped`).

mod announce;
mod error;
mod http;
mod response;
mod udp;

pub use announce::Announcer;
pub use error::TrackerError;
pub use http::{AnnounceRequest, HttpTracker};
pub use response::{parse_compact_peers, AnnounceResponse, TrackerEvent};
pub use udp::UdpTracker;

#[cfg(test)]
mod tests;
