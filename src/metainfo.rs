//! Torrent metainfo handling (BEP-3).
//!
//! Parses `.torrent` files into the static descriptor the engine runs from:
//! piece geometry, piece hashes, the file layout, and tracker URLs.

mod error;
mod info_hash;
mod torrent;

pub use error::MetainfoError;
pub use info_hash::InfoHash;
pub use torrent::{File, Info, Metainfo};

#[cfg(test)]
mod tests;
