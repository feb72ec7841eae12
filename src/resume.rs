//! On-disk resume state.
//!
//! One bencoded file per torrent, keyed by info hash, recording where the
//! torrent came from, where its data lands, which pieces are verified, and
//! its tracker list. Loading at add-time lets a restarted engine seed the
//! work queue with only the missing pieces.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;

use crate::bencode::{decode, Value};
use crate::metainfo::InfoHash;

#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("invalid resume data: {0}")]
    Invalid(&'static str),
}

/// A torrent's saved progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeData {
    pub info_hash: InfoHash,
    /// Path of the original torrent file.
    pub source: PathBuf,
    /// Directory the data is written into.
    pub target_dir: PathBuf,
    /// Raw global bitfield bytes.
    pub bitfield: Vec<u8>,
    pub trackers: Vec<String>,
}

impl ResumeData {
    pub fn encode(&self) -> Vec<u8> {
        let mut dict = BTreeMap::new();
        dict.insert(
            Bytes::from_static(b"bitfield"),
            Value::from(self.bitfield.clone()),
        );
        dict.insert(
            Bytes::from_static(b"info hash"),
            Value::from(self.info_hash.as_bytes().to_vec()),
        );
        dict.insert(
            Bytes::from_static(b"source"),
            Value::string(&self.source.to_string_lossy()),
        );
        dict.insert(
            Bytes::from_static(b"target"),
            Value::string(&self.target_dir.to_string_lossy()),
        );
        dict.insert(
            Bytes::from_static(b"trackers"),
            Value::List(self.trackers.iter().map(|t| Value::string(t)).collect()),
        );
        Value::Dict(dict).encode()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ResumeError> {
        let value = decode(data)?;

        let hash_bytes = value
            .get(b"info hash")
            .and_then(|v| v.as_bytes())
            .ok_or(ResumeError::Invalid("info hash"))?;
        if hash_bytes.len() != 20 {
            return Err(ResumeError::Invalid("info hash"));
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(hash_bytes);

        let source = value
            .get(b"source")
            .and_then(|v| v.as_str())
            .ok_or(ResumeError::Invalid("source"))?;
        let target = value
            .get(b"target")
            .and_then(|v| v.as_str())
            .ok_or(ResumeError::Invalid("target"))?;
        let bitfield = value
            .get(b"bitfield")
            .and_then(|v| v.as_bytes())
            .ok_or(ResumeError::Invalid("bitfield"))?
            .to_vec();
        let trackers = value
            .get(b"trackers")
            .and_then(|v| v.as_list())
            .map(|list| {
                list.iter()
                    .filter_map(|t| t.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            info_hash: InfoHash::from_bytes(hash),
            source: PathBuf::from(source),
            target_dir: PathBuf::from(target),
            bitfield,
            trackers,
        })
    }
}

fn resume_path(state_dir: &Path, info_hash: InfoHash) -> PathBuf {
    state_dir.join(format!("{}.resume", info_hash.to_hex()))
}

/// Writes a torrent's resume record under `state_dir`.
pub async fn save(state_dir: &Path, data: &ResumeData) -> Result<(), ResumeError> {
    tokio::fs::create_dir_all(state_dir).await?;
    tokio::fs::write(resume_path(state_dir, data.info_hash), data.encode()).await?;
    Ok(())
}

/// Loads a torrent's resume record, if one exists.
pub async fn load(state_dir: &Path, info_hash: InfoHash) -> Result<Option<ResumeData>, ResumeError> {
    match tokio::fs::read(resume_path(state_dir, info_hash)).await {
        Ok(data) => Ok(Some(ResumeData::decode(&data)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Deletes a torrent's resume record, if one exists.
pub async fn remove(state_dir: &Path, info_hash: InfoHash) -> Result<(), ResumeError> {
    match tokio::fs::remove_file(resume_path(state_dir, info_hash)).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_round_trip() {
        let data = ResumeData {
            info_hash: InfoHash::from_bytes([7u8; 20]),
            source: PathBuf::from("/torrents/example.torrent"),
            target_dir: PathBuf::from("/downloads"),
            bitfield: vec![0b1110_0000],
            trackers: vec!["udp://tracker:6969".into(), "http://tracker/ann".into()],
        };

        let decoded = ResumeData::decode(&data.encode()).unwrap();
        assert_eq!(decoded, data);
    }

    #[tokio::test]
    async fn test_save_load_remove() {
        let temp = tempfile::TempDir::new().unwrap();
        let data = ResumeData {
            info_hash: InfoHash::from_bytes([9u8; 20]),
            source: PathBuf::from("a.torrent"),
            target_dir: PathBuf::from("out"),
            bitfield: vec![0xFF, 0x80],
            trackers: vec![],
        };

        assert!(load(temp.path(), data.info_hash).await.unwrap().is_none());
        save(temp.path(), &data).await.unwrap();
        assert_eq!(load(temp.path(), data.info_hash).await.unwrap(), Some(data.clone()));
        remove(temp.path(), data.info_hash).await.unwrap();
        assert!(load(temp.path(), data.info_hash).await.unwrap().is_none());
    }
}
