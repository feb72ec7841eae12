//! Peer wire protocol (BEP-3).
//!
//! This module implements the peer half of the engine: the handshake and
//! message codec, the framed connection, and the per-peer session state
//! machine with adaptive request pipelining.

mod bitfield;
mod error;
mod message;
mod peer_id;
mod rate;
mod session;
mod transport;

pub use bitfield::Bitfield;
pub use error::PeerError;
pub use message::{Handshake, Message, MessageId, HANDSHAKE_LEN};
pub use peer_id::PeerId;
pub use rate::{download_rate, queue_target, RateWindow};
pub use session::{PeerContext, PeerHandle};
pub use transport::{FrameReader, FrameWriter};

pub(crate) use session::{spawn_inbound, spawn_outbound};
pub(crate) use transport::{read_handshake, send_handshake};

#[cfg(test)]
mod tests;
