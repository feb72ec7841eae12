use super::*;
use bytes::Bytes;
use std::time::{Duration, Instant};

fn round_trip(message: Message) -> Message {
    let framed = message.encode();
    let length = u32::from_be_bytes([framed[0], framed[1], framed[2], framed[3]]) as usize;
    assert_eq!(framed.len(), 4 + length, "length prefix disagrees with frame");
    Message::decode(framed.slice(4..)).unwrap()
}

#[test]
fn test_handshake_round_trip() {
    let handshake = Handshake::new([1u8; 20], [2u8; 20]);
    let encoded = handshake.encode();
    assert_eq!(encoded.len(), HANDSHAKE_LEN);
    // Reserved bytes are all zero on send.
    assert_eq!(&encoded[20..28], &[0u8; 8]);

    let decoded = Handshake::decode(&encoded).unwrap();
    assert_eq!(decoded.info_hash, [1u8; 20]);
    assert_eq!(decoded.peer_id, [2u8; 20]);
}

#[test]
fn test_handshake_rejects_garbage() {
    assert!(Handshake::decode(&[0u8; HANDSHAKE_LEN]).is_err());
    assert!(Handshake::decode(&[0u8; 10]).is_err());

    let mut encoded = Handshake::new([1u8; 20], [2u8; 20]).encode().to_vec();
    encoded[0] = 20;
    assert!(Handshake::decode(&encoded).is_err());
}

#[test]
fn test_handshake_ignores_reserved_bits() {
    let mut encoded = Handshake::new([1u8; 20], [2u8; 20]).encode().to_vec();
    encoded[20..28].copy_from_slice(&[0xFFu8; 8]);
    let decoded = Handshake::decode(&encoded).unwrap();
    assert_eq!(decoded.info_hash, [1u8; 20]);
}

#[test]
fn test_message_round_trips() {
    let messages = vec![
        Message::KeepAlive,
        Message::Choke,
        Message::Unchoke,
        Message::Interested,
        Message::NotInterested,
        Message::Have { index: 42 },
        Message::Bitfield(Bytes::from_static(&[0b1110_0000])),
        Message::Request {
            index: 1,
            begin: 16384,
            length: 16384,
        },
        Message::Piece {
            index: 3,
            begin: 0,
            data: Bytes::from_static(b"block bytes"),
        },
        Message::Cancel {
            index: 1,
            begin: 16384,
            length: 16384,
        },
        Message::Port(6881),
    ];

    for message in messages {
        assert_eq!(round_trip(message.clone()), message);
    }
}

#[test]
fn test_decode_rejects_wrong_payload_lengths() {
    // (id, payload) pairs whose sizes disagree with the tag.
    let cases: Vec<(u8, Vec<u8>)> = vec![
        (0, vec![0]),          // Choke with a payload byte
        (1, vec![1, 2]),       // Unchoke with payload
        (4, vec![0, 0, 0]),    // Have with 3 bytes
        (4, vec![0; 5]),       // Have with 5 bytes
        (6, vec![0; 11]),      // Request with 11 bytes
        (6, vec![0; 13]),      // Request with 13 bytes
        (7, vec![0; 7]),       // Piece shorter than its header
        (8, vec![0; 4]),       // Cancel with 4 bytes
        (9, vec![0]),          // Port with 1 byte
    ];

    for (id, payload) in cases {
        let mut frame = vec![id];
        frame.extend_from_slice(&payload);
        let result = Message::decode(Bytes::from(frame));
        assert!(
            matches!(result, Err(PeerError::InvalidMessage(_))),
            "id {} with {} payload bytes should be rejected",
            id,
            payload.len(),
        );
    }
}

#[test]
fn test_decode_unknown_id() {
    let result = Message::decode(Bytes::from_static(&[42, 1, 2, 3]));
    assert!(matches!(result, Err(PeerError::UnknownMessageId(42))));
}

#[test]
fn test_decode_empty_payload_is_keepalive() {
    assert_eq!(Message::decode(Bytes::new()).unwrap(), Message::KeepAlive);
}

#[test]
fn test_bitfield_msb_first() {
    let bf = Bitfield::from_bytes(&[0b1010_0000], 8);
    assert!(bf.has(0));
    assert!(!bf.has(1));
    assert!(bf.has(2));
    assert!(!bf.has(7));
}

#[test]
fn test_bitfield_set_and_count() {
    let mut bf = Bitfield::new(100);
    assert!(!bf.has(0));
    bf.set(0);
    bf.set(99);
    assert!(bf.has(0));
    assert!(bf.has(99));
    assert_eq!(bf.count(), 2);
    assert!(!bf.is_complete());

    // Out of range is a no-op.
    bf.set(100);
    assert_eq!(bf.count(), 2);
    assert!(!bf.has(100));
}

#[test]
fn test_bitfield_full_masks_spare_bits() {
    // 10 pieces fit in 2 bytes; the 6 spare bits must stay zero.
    let bf = Bitfield::full(10);
    assert_eq!(bf.as_bytes(), &[0xFF, 0b1100_0000]);
    assert_eq!(bf.count(), 10);
    assert!(bf.is_complete());
}

#[test]
fn test_bitfield_from_bytes_masks_spare_bits() {
    let bf = Bitfield::from_bytes(&[0xFF, 0xFF], 10);
    assert_eq!(bf.as_bytes(), &[0xFF, 0b1100_0000]);
    assert_eq!(bf.count(), 10);
}

#[test]
fn test_bitfield_missing() {
    let mut bf = Bitfield::new(5);
    bf.set(1);
    bf.set(3);
    assert_eq!(bf.missing(), vec![0, 2, 4]);
}

#[test]
fn test_peer_id_prefix() {
    let a = PeerId::generate();
    let b = PeerId::generate();
    assert_ne!(a.0, b.0);
    assert!(a.0.starts_with(crate::constants::CLIENT_PREFIX));
    assert_eq!(a.url_encode().len(), 60);
}

#[test]
fn test_rate_window_expires_entries() {
    let window = Duration::from_secs(20);
    let mut rate = RateWindow::new(window);
    let t0 = Instant::now();

    rate.record_at(t0, 1000);
    rate.record_at(t0 + Duration::from_secs(5), 500);

    assert_eq!(rate.total_at(t0 + Duration::from_secs(19)), 1500);
    // The first entry reverses exactly one window after it was recorded.
    assert_eq!(rate.total_at(t0 + Duration::from_secs(20)), 500);
    assert_eq!(rate.total_at(t0 + Duration::from_secs(25)), 0);
}

#[test]
fn test_queue_target_converges_at_steady_rate() {
    // 8 MiB/s is 512 blocks of 16 KiB per second.
    assert_eq!(queue_target(8 * 1024 * 1024, 5, 625), 512);
}

#[test]
fn test_queue_target_clamps() {
    // 1 KiB/s rounds to zero blocks; clamped up to the minimum.
    assert_eq!(queue_target(1024, 5, 625), 5);
    // Absurd rates clamp to the maximum.
    assert_eq!(queue_target(100 * 1024 * 1024, 5, 625), 625);
}

#[test]
fn test_download_rate_uses_elapsed_before_full_window() {
    let window = Duration::from_secs(20);
    // 1 MiB in the 4 s since unchoke: 256 KiB/s, not 1 MiB / 20 s.
    let rate = download_rate(1024 * 1024, Duration::from_secs(4), window);
    assert_eq!(rate, 256 * 1024);

    // After a full window, divide by the window.
    let rate = download_rate(1024 * 1024, Duration::from_secs(60), window);
    assert_eq!(rate, 52428);

    assert_eq!(download_rate(1024, Duration::ZERO, window), 0);
}
