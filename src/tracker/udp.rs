use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng as _;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;

use super::error::TrackerError;
use super::http::AnnounceRequest;
use super::response::{parse_compact_peers, AnnounceResponse};

const PROTOCOL_ID: u64 = 0x41727101980;
const ACTION_CONNECT: u32 = 0;
const ACTION_ANNOUNCE: u32 = 1;
const ACTION_ERROR: u32 = 3;
const UDP_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRIES: u32 = 3;

/// A UDP tracker client (BEP-15).
///
/// The protocol is two round-trips: a connect request yielding a connection
/// id, then the announce carrying it. Transaction ids guard against stray
/// datagrams; timeouts retry with exponential backoff.
pub struct UdpTracker {
    socket: UdpSocket,
    connection_id: Option<u64>,
}

impl UdpTracker {
    pub async fn connect(url: &str) -> Result<Self, TrackerError> {
        let addr = resolve_udp_url(url).await?;

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;

        let mut tracker = Self {
            socket,
            connection_id: None,
        };
        tracker.do_connect().await?;
        Ok(tracker)
    }

    async fn do_connect(&mut self) -> Result<(), TrackerError> {
        let transaction_id: u32 = rand::rng().random();

        let mut request = Vec::with_capacity(16);
        request.extend_from_slice(&PROTOCOL_ID.to_be_bytes());
        request.extend_from_slice(&ACTION_CONNECT.to_be_bytes());
        request.extend_from_slice(&transaction_id.to_be_bytes());

        let response = self.send_and_receive(&request, 16).await?;

        let action = u32::from_be_bytes([response[0], response[1], response[2], response[3]]);
        let tid = u32::from_be_bytes([response[4], response[5], response[6], response[7]]);
        if action != ACTION_CONNECT || tid != transaction_id {
            return Err(TrackerError::InvalidResponse("connect response mismatch"));
        }

        let mut id = [0u8; 8];
        id.copy_from_slice(&response[8..16]);
        self.connection_id = Some(u64::from_be_bytes(id));
        Ok(())
    }

    pub async fn announce(
        &mut self,
        announce: &AnnounceRequest,
    ) -> Result<AnnounceResponse, TrackerError> {
        let connection_id = self
            .connection_id
            .ok_or(TrackerError::InvalidResponse("not connected"))?;

        let transaction_id: u32 = rand::rng().random();
        let key: u32 = rand::rng().random();

        let mut request = Vec::with_capacity(98);
        request.extend_from_slice(&connection_id.to_be_bytes());
        request.extend_from_slice(&ACTION_ANNOUNCE.to_be_bytes());
        request.extend_from_slice(&transaction_id.to_be_bytes());
        request.extend_from_slice(announce.info_hash.as_bytes());
        request.extend_from_slice(announce.peer_id.as_bytes());
        request.extend_from_slice(&announce.downloaded.to_be_bytes());
        request.extend_from_slice(&announce.left.to_be_bytes());
        request.extend_from_slice(&announce.uploaded.to_be_bytes());
        request.extend_from_slice(&announce.event.as_udp_id().to_be_bytes());
        request.extend_from_slice(&0u32.to_be_bytes()); // IP (0 = sender's)
        request.extend_from_slice(&key.to_be_bytes());
        request.extend_from_slice(&(-1i32).to_be_bytes()); // num_want default
        request.extend_from_slice(&announce.port.to_be_bytes());

        let response = self.send_and_receive(&request, 20).await?;

        let action = u32::from_be_bytes([response[0], response[1], response[2], response[3]]);
        let tid = u32::from_be_bytes([response[4], response[5], response[6], response[7]]);

        if action == ACTION_ERROR {
            let message = String::from_utf8_lossy(&response[8..]).to_string();
            return Err(TrackerError::Failure(message));
        }
        if action != ACTION_ANNOUNCE || tid != transaction_id {
            return Err(TrackerError::InvalidResponse("announce response mismatch"));
        }

        let interval = u32::from_be_bytes([response[8], response[9], response[10], response[11]]);
        let leechers = u32::from_be_bytes([response[12], response[13], response[14], response[15]]);
        let seeders = u32::from_be_bytes([response[16], response[17], response[18], response[19]]);

        let mut result = AnnounceResponse::new(interval);
        result.complete = Some(seeders);
        result.incomplete = Some(leechers);
        result.peers = parse_compact_peers(&response[20..]);
        Ok(result)
    }

    async fn send_and_receive(
        &self,
        request: &[u8],
        min_response_size: usize,
    ) -> Result<Vec<u8>, TrackerError> {
        let mut buf = vec![0u8; 2048];

        for attempt in 0..MAX_RETRIES {
            self.socket.send(request).await?;

            match timeout(UDP_TIMEOUT * (1 << attempt), self.socket.recv(&mut buf)).await {
                Ok(Ok(n)) if n >= min_response_size => return Ok(buf[..n].to_vec()),
                Ok(Ok(_)) => return Err(TrackerError::InvalidResponse("response too short")),
                Ok(Err(err)) => return Err(TrackerError::Io(err)),
                Err(_) => continue,
            }
        }

        Err(TrackerError::Timeout)
    }
}

async fn resolve_udp_url(url: &str) -> Result<SocketAddr, TrackerError> {
    let rest = url
        .strip_prefix("udp://")
        .ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))?;
    let authority = rest.split('/').next().unwrap_or(rest);

    lookup_host(authority)
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))
}
