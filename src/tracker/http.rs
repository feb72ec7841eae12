use std::time::Duration;

use reqwest::Client;

use crate::bencode::decode;
use crate::metainfo::InfoHash;
use crate::peer::PeerId;

use super::error::TrackerError;
use super::response::{parse_compact_peers, AnnounceResponse, TrackerEvent};

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// An HTTP tracker client (BEP-3).
///
/// Announces are GET requests with the torrent identity and progress in the
/// query string; the reply is a bencoded dictionary.
pub struct HttpTracker {
    client: Client,
    url: String,
}

impl HttpTracker {
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TrackerError::InvalidUrl(url.to_string()));
        }

        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub async fn announce(
        &self,
        request: &AnnounceRequest,
    ) -> Result<AnnounceResponse, TrackerError> {
        let mut url = format!(
            "{}?info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            self.url,
            request.info_hash.url_encode(),
            request.peer_id.url_encode(),
            request.port,
            request.uploaded,
            request.downloaded,
            request.left,
        );
        let event = request.event.as_str();
        if !event.is_empty() {
            url.push_str("&event=");
            url.push_str(event);
        }

        let body = self.client.get(&url).send().await?.bytes().await?;
        parse_http_response(&body)
    }
}

/// One announce's parameters, shared by the HTTP and UDP clients.
#[derive(Debug, Clone, Copy)]
pub struct AnnounceRequest {
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: TrackerEvent,
}

fn parse_http_response(body: &[u8]) -> Result<AnnounceResponse, TrackerError> {
    let value = decode(body)?;
    let dict = value
        .as_dict()
        .ok_or(TrackerError::InvalidResponse("expected dict"))?;

    if let Some(reason) = dict
        .get(b"failure reason".as_slice())
        .and_then(|v| v.as_str())
    {
        return Err(TrackerError::Failure(reason.to_string()));
    }

    let interval = dict
        .get(b"interval".as_slice())
        .and_then(|v| v.as_integer())
        .ok_or(TrackerError::InvalidResponse("missing interval"))? as u32;

    let mut response = AnnounceResponse::new(interval);

    response.complete = dict
        .get(b"complete".as_slice())
        .and_then(|v| v.as_integer())
        .map(|n| n as u32);
    response.incomplete = dict
        .get(b"incomplete".as_slice())
        .and_then(|v| v.as_integer())
        .map(|n| n as u32);

    match dict.get(b"peers".as_slice()) {
        // Compact form: a byte string of 6-byte entries.
        Some(peers) if peers.as_bytes().is_some() => {
            response.peers = parse_compact_peers(peers.as_bytes().unwrap());
        }
        // Dictionary form: a list of {ip, port} dicts.
        Some(peers) => {
            for peer in peers.as_list().unwrap_or(&[]) {
                let ip = peer
                    .get(b"ip")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse().ok());
                let port = peer
                    .get(b"port")
                    .and_then(|v| v.as_integer())
                    .map(|p| p as u16);
                if let (Some(ip), Some(port)) = (ip, port) {
                    response.peers.push(std::net::SocketAddr::new(ip, port));
                }
            }
        }
        None => {}
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compact_response() {
        // interval 1800, two compact peers
        let mut body = b"d8:intervali1800e5:peers12:".to_vec();
        body.extend_from_slice(&[127, 0, 0, 1, 0x1A, 0xE1, 10, 0, 0, 2, 0x1A, 0xE2]);
        body.push(b'e');

        let response = parse_http_response(&body).unwrap();
        assert_eq!(response.interval, 1800);
        assert_eq!(response.peers.len(), 2);
        assert_eq!(response.peers[0].to_string(), "127.0.0.1:6881");
        assert_eq!(response.peers[1].to_string(), "10.0.0.2:6882");
    }

    #[test]
    fn test_parse_failure_response() {
        let body = b"d14:failure reason12:unregisterede";
        match parse_http_response(body) {
            Err(TrackerError::Failure(reason)) => assert_eq!(reason, "unregistered"),
            other => panic!("expected failure, got {:?}", other.map(|r| r.interval)),
        }
    }

    #[test]
    fn test_parse_dict_peers() {
        let body = b"d8:intervali60e5:peersld2:ip9:127.0.0.14:porti6881eeee";
        let response = parse_http_response(body).unwrap();
        assert_eq!(response.peers.len(), 1);
        assert_eq!(response.peers[0].to_string(), "127.0.0.1:6881");
    }
}
