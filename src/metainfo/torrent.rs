use std::path::PathBuf;

use crate::bencode::{decode, Value};

use super::error::MetainfoError;
use super::info_hash::InfoHash;

/// A parsed torrent file.
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// The info dictionary: piece geometry, hashes, and file layout.
    pub info: Info,
    /// SHA-1 of the bencoded info dictionary.
    pub info_hash: InfoHash,
    /// Primary tracker URL.
    pub announce: Option<String>,
    /// Multi-tier tracker list (BEP-12).
    pub announce_list: Vec<Vec<String>>,
}

/// The immutable torrent descriptor from the `info` dictionary.
#[derive(Debug, Clone)]
pub struct Info {
    /// Suggested name for the file or directory.
    pub name: String,
    /// Bytes per piece; the last piece may be shorter.
    pub piece_length: u32,
    /// SHA-1 hash of each piece.
    pub pieces: Vec<[u8; 20]>,
    /// Files in layout order, with running offsets.
    pub files: Vec<File>,
    /// Sum of all file lengths.
    pub total_length: u64,
}

/// A file within a torrent, positioned in the piece space.
#[derive(Debug, Clone)]
pub struct File {
    /// Path relative to the download directory.
    pub path: PathBuf,
    /// Size in bytes.
    pub length: u64,
    /// Byte offset within the torrent's concatenated data.
    pub offset: u64,
}

impl Metainfo {
    /// Parses a torrent file from raw bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        let root = decode(data)?;
        let dict = root.as_dict().ok_or(MetainfoError::InvalidField("root"))?;

        let info_value = dict
            .get(b"info".as_slice())
            .ok_or(MetainfoError::MissingField("info"))?;
        // Our encoder is canonical, so re-encoding the decoded dictionary
        // reproduces the original info bytes for hashing.
        let info_hash = InfoHash::from_info_bytes(&info_value.encode());
        let info = parse_info(info_value)?;

        let announce = dict
            .get(b"announce".as_slice())
            .and_then(|v| v.as_str())
            .map(String::from);

        let announce_list = dict
            .get(b"announce-list".as_slice())
            .and_then(|v| v.as_list())
            .map(|tiers| {
                tiers
                    .iter()
                    .filter_map(|tier| {
                        tier.as_list().map(|urls| {
                            urls.iter()
                                .filter_map(|u| u.as_str().map(String::from))
                                .collect()
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            info,
            info_hash,
            announce,
            announce_list,
        })
    }

    /// All tracker URLs, primary first, duplicates removed.
    pub fn trackers(&self) -> Vec<String> {
        let mut trackers = Vec::new();
        if let Some(ref announce) = self.announce {
            trackers.push(announce.clone());
        }
        for tier in &self.announce_list {
            for url in tier {
                if !trackers.contains(url) {
                    trackers.push(url.clone());
                }
            }
        }
        trackers
    }
}

impl Info {
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Size of piece `index` in bytes.
    ///
    /// Every piece is `piece_length` bytes except the last, which holds the
    /// remainder of `total_length`.
    pub fn piece_size(&self, index: u32) -> u32 {
        let last = self.pieces.len() as u32 - 1;
        if index < last {
            self.piece_length
        } else {
            (self.total_length - u64::from(last) * u64::from(self.piece_length)) as u32
        }
    }

    /// The expected SHA-1 for piece `index`.
    pub fn expected_hash(&self, index: u32) -> Option<&[u8; 20]> {
        self.pieces.get(index as usize)
    }

    /// Bytes needed for a bitfield over all pieces.
    pub fn bitfield_len(&self) -> usize {
        self.pieces.len().div_ceil(8)
    }
}

fn parse_info(value: &Value) -> Result<Info, MetainfoError> {
    let dict = value.as_dict().ok_or(MetainfoError::InvalidField("info"))?;

    let name = dict
        .get(b"name".as_slice())
        .and_then(|v| v.as_str())
        .ok_or(MetainfoError::MissingField("name"))?
        .to_string();

    let piece_length = dict
        .get(b"piece length".as_slice())
        .and_then(|v| v.as_integer())
        .filter(|&n| n > 0)
        .ok_or(MetainfoError::MissingField("piece length"))?
        as u32;

    let pieces_raw = dict
        .get(b"pieces".as_slice())
        .and_then(|v| v.as_bytes())
        .ok_or(MetainfoError::MissingField("pieces"))?;
    if pieces_raw.is_empty() || pieces_raw.len() % 20 != 0 {
        return Err(MetainfoError::InvalidPieceHashes);
    }
    let pieces: Vec<[u8; 20]> = pieces_raw
        .chunks_exact(20)
        .map(|chunk| {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect();

    let files = parse_files(dict, &name)?;
    let total_length: u64 = files.iter().map(|f| f.length).sum();

    // total_length must land inside the last piece.
    let full = u64::from(piece_length) * (pieces.len() as u64 - 1);
    if total_length <= full || total_length > full + u64::from(piece_length) {
        return Err(MetainfoError::InvalidGeometry);
    }

    Ok(Info {
        name,
        piece_length,
        pieces,
        files,
        total_length,
    })
}

fn parse_files(
    dict: &std::collections::BTreeMap<bytes::Bytes, Value>,
    name: &str,
) -> Result<Vec<File>, MetainfoError> {
    // Single-file torrents carry `length` directly; multi-file torrents
    // carry a `files` list with per-file path components under the name dir.
    if let Some(length) = dict.get(b"length".as_slice()).and_then(|v| v.as_integer()) {
        if length < 0 {
            return Err(MetainfoError::InvalidField("length"));
        }
        return Ok(vec![File {
            path: PathBuf::from(name),
            length: length as u64,
            offset: 0,
        }]);
    }

    let entries = dict
        .get(b"files".as_slice())
        .and_then(|v| v.as_list())
        .ok_or(MetainfoError::MissingField("length"))?;

    let mut files = Vec::with_capacity(entries.len());
    let mut offset = 0u64;
    for entry in entries {
        let length = entry
            .get(b"length")
            .and_then(|v| v.as_integer())
            .filter(|&n| n >= 0)
            .ok_or(MetainfoError::InvalidField("files"))? as u64;

        let mut path = PathBuf::from(name);
        let components = entry
            .get(b"path")
            .and_then(|v| v.as_list())
            .ok_or(MetainfoError::InvalidField("files"))?;
        if components.is_empty() {
            return Err(MetainfoError::InvalidField("path"));
        }
        for component in components {
            let part = component
                .as_str()
                .ok_or(MetainfoError::InvalidField("path"))?;
            if part.is_empty() || part == "." || part == ".." {
                return Err(MetainfoError::InvalidField("path"));
            }
            path.push(part);
        }

        files.push(File {
            path,
            length,
            offset,
        });
        offset += length;
    }

    if files.is_empty() {
        return Err(MetainfoError::InvalidField("files"));
    }
    Ok(files)
}
