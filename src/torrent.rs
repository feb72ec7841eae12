//! Per-torrent coordination.
//!
//! One coordinator task owns each torrent's run: it seeds the work queue,
//! spawns peer sessions from the tracker's address stream, collects
//! completed pieces, maintains the global bitfield, and broadcasts `Have`
//! announcements. Peer sessions talk back only through channels, so
//! ownership stays a tree: session registry, coordinator, peers.

mod coordinator;
mod stats;
mod work;

pub use stats::{TorrentState, TorrentStats, TorrentStatus};
pub use work::WorkQueue;

pub(crate) use coordinator::{spawn_coordinator, CoordinatorHandle};
