use super::*;
use crate::metainfo::InfoHash;
use crate::peer::PeerId;
use tokio::net::UdpSocket;

#[test]
fn test_event_strings() {
    assert_eq!(TrackerEvent::None.as_str(), "");
    assert_eq!(TrackerEvent::Started.as_str(), "started");
    assert_eq!(TrackerEvent::Stopped.as_str(), "stopped");
    assert_eq!(TrackerEvent::Completed.as_str(), "completed");
}

#[test]
fn test_event_udp_ids() {
    assert_eq!(TrackerEvent::None.as_udp_id(), 0);
    assert_eq!(TrackerEvent::Completed.as_udp_id(), 1);
    assert_eq!(TrackerEvent::Started.as_udp_id(), 2);
    assert_eq!(TrackerEvent::Stopped.as_udp_id(), 3);
}

#[test]
fn test_parse_compact_peers_drops_partial_entry() {
    let mut data = vec![192, 168, 0, 1, 0x1A, 0xE1, 10, 0, 0, 1, 0x1A, 0xE2];
    data.push(99); // trailing partial entry

    let peers = parse_compact_peers(&data);
    assert_eq!(peers.len(), 2);
    assert_eq!(peers[0].to_string(), "192.168.0.1:6881");
    assert_eq!(peers[1].to_string(), "10.0.0.1:6882");
}

#[test]
fn test_parse_compact_peers_empty() {
    assert!(parse_compact_peers(&[]).is_empty());
}

/// Drives `UdpTracker` against a scripted one-shot BEP-15 tracker.
#[tokio::test]
async fn test_udp_tracker_announce() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();

    let info_hash = InfoHash::from_bytes([0x42; 20]);
    let expected_hash = *info_hash.as_bytes();

    tokio::spawn(async move {
        let mut buf = [0u8; 1024];

        // Connect round: echo the transaction id, hand out a connection id.
        let (n, from) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(n, 16);
        assert_eq!(&buf[..8], &0x41727101980u64.to_be_bytes());
        let mut reply = Vec::new();
        reply.extend_from_slice(&0u32.to_be_bytes());
        reply.extend_from_slice(&buf[12..16]);
        reply.extend_from_slice(&0xDEAD_BEEFu64.to_be_bytes());
        server.send_to(&reply, from).await.unwrap();

        // Announce round: check the request shape, return one peer.
        let (n, from) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(n, 98);
        assert_eq!(&buf[..8], &0xDEAD_BEEFu64.to_be_bytes());
        assert_eq!(&buf[16..36], &expected_hash);
        let mut reply = Vec::new();
        reply.extend_from_slice(&1u32.to_be_bytes());
        reply.extend_from_slice(&buf[12..16]);
        reply.extend_from_slice(&1800u32.to_be_bytes()); // interval
        reply.extend_from_slice(&3u32.to_be_bytes()); // leechers
        reply.extend_from_slice(&5u32.to_be_bytes()); // seeders
        reply.extend_from_slice(&[127, 0, 0, 1, 0x1A, 0xE1]);
        server.send_to(&reply, from).await.unwrap();
    });

    let mut tracker = UdpTracker::connect(&format!("udp://{}", server_addr))
        .await
        .unwrap();
    let response = tracker
        .announce(&AnnounceRequest {
            info_hash,
            peer_id: PeerId::generate(),
            port: 6881,
            uploaded: 0,
            downloaded: 0,
            left: 1000,
            event: TrackerEvent::Started,
        })
        .await
        .unwrap();

    assert_eq!(response.interval, 1800);
    assert_eq!(response.complete, Some(5));
    assert_eq!(response.incomplete, Some(3));
    assert_eq!(response.peers.len(), 1);
    assert_eq!(response.peers[0].to_string(), "127.0.0.1:6881");
}

/// An error action from the tracker surfaces as a failure.
#[tokio::test]
async fn test_udp_tracker_error_action() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 1024];

        let (_, from) = server.recv_from(&mut buf).await.unwrap();
        let mut reply = Vec::new();
        reply.extend_from_slice(&0u32.to_be_bytes());
        reply.extend_from_slice(&buf[12..16]);
        reply.extend_from_slice(&1u64.to_be_bytes());
        server.send_to(&reply, from).await.unwrap();

        let (_, from) = server.recv_from(&mut buf).await.unwrap();
        let mut reply = Vec::new();
        reply.extend_from_slice(&3u32.to_be_bytes());
        reply.extend_from_slice(&buf[12..16]);
        reply.extend_from_slice(b"torrent not registered");
        server.send_to(&reply, from).await.unwrap();
    });

    let mut tracker = UdpTracker::connect(&format!("udp://{}", server_addr))
        .await
        .unwrap();
    let result = tracker
        .announce(&AnnounceRequest {
            info_hash: InfoHash::from_bytes([1; 20]),
            peer_id: PeerId::generate(),
            port: 6881,
            uploaded: 0,
            downloaded: 0,
            left: 0,
            event: TrackerEvent::None,
        })
        .await;

    match result {
        Err(TrackerError::Failure(reason)) => assert_eq!(reason, "torrent not registered"),
        other => panic!("expected tracker failure, got {:?}", other.map(|r| r.interval)),
    }
}

#[test]
fn test_rejects_unsupported_scheme() {
    assert!(HttpTracker::new("udp://tracker:6969").is_err());
}
