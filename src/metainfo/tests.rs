use super::*;
use crate::bencode::Value;
use bytes::Bytes;
use std::collections::BTreeMap;

fn bench_str(s: &str) -> Value {
    Value::string(s)
}

fn build_torrent(info_entries: Vec<(&str, Value)>) -> Vec<u8> {
    let mut info = BTreeMap::new();
    for (key, value) in info_entries {
        info.insert(Bytes::copy_from_slice(key.as_bytes()), value);
    }
    let mut root = BTreeMap::new();
    root.insert(
        Bytes::from_static(b"announce"),
        bench_str("http://tracker.example.com/announce"),
    );
    root.insert(Bytes::from_static(b"info"), Value::Dict(info));
    Value::Dict(root).encode()
}

fn fake_hashes(count: usize) -> Value {
    let mut raw = Vec::with_capacity(count * 20);
    for i in 0..count {
        raw.extend_from_slice(&[i as u8; 20]);
    }
    Value::Bytes(Bytes::from(raw))
}

#[test]
fn test_parse_single_file() {
    let data = build_torrent(vec![
        ("length", Value::Integer(100_000)),
        ("name", bench_str("file.bin")),
        ("piece length", Value::Integer(32768)),
        ("pieces", fake_hashes(4)),
    ]);

    let meta = Metainfo::from_bytes(&data).unwrap();
    assert_eq!(meta.info.name, "file.bin");
    assert_eq!(meta.info.piece_count(), 4);
    assert_eq!(meta.info.total_length, 100_000);
    assert_eq!(meta.info.files.len(), 1);
    assert_eq!(meta.info.files[0].path.to_str(), Some("file.bin"));
    assert_eq!(
        meta.announce.as_deref(),
        Some("http://tracker.example.com/announce")
    );
}

#[test]
fn test_parse_multi_file() {
    let file = |len: i64, name: &str| {
        let mut entry = BTreeMap::new();
        entry.insert(Bytes::from_static(b"length"), Value::Integer(len));
        entry.insert(
            Bytes::from_static(b"path"),
            Value::List(vec![bench_str("sub"), bench_str(name)]),
        );
        Value::Dict(entry)
    };
    let data = build_torrent(vec![
        ("files", Value::List(vec![file(60_000, "a"), file(40_000, "b")])),
        ("name", bench_str("dir")),
        ("piece length", Value::Integer(32768)),
        ("pieces", fake_hashes(4)),
    ]);

    let meta = Metainfo::from_bytes(&data).unwrap();
    assert_eq!(meta.info.total_length, 100_000);
    assert_eq!(meta.info.files[0].offset, 0);
    assert_eq!(meta.info.files[1].offset, 60_000);
    assert_eq!(meta.info.files[1].path.to_str(), Some("dir/sub/b"));
}

#[test]
fn test_parse_rejects_path_traversal() {
    let mut entry = BTreeMap::new();
    entry.insert(Bytes::from_static(b"length"), Value::Integer(100_000));
    entry.insert(
        Bytes::from_static(b"path"),
        Value::List(vec![bench_str(".."), bench_str("evil")]),
    );
    let data = build_torrent(vec![
        ("files", Value::List(vec![Value::Dict(entry)])),
        ("name", bench_str("dir")),
        ("piece length", Value::Integer(32768)),
        ("pieces", fake_hashes(4)),
    ]);

    assert!(Metainfo::from_bytes(&data).is_err());
}

#[test]
fn test_parse_rejects_bad_piece_hashes() {
    let data = build_torrent(vec![
        ("length", Value::Integer(100_000)),
        ("name", bench_str("file.bin")),
        ("piece length", Value::Integer(32768)),
        ("pieces", Value::Bytes(Bytes::from_static(&[0u8; 30]))),
    ]);
    assert!(Metainfo::from_bytes(&data).is_err());
}

#[test]
fn test_parse_rejects_geometry_mismatch() {
    // Four pieces of 32 KiB can hold at most 131072 bytes.
    let data = build_torrent(vec![
        ("length", Value::Integer(200_000)),
        ("name", bench_str("file.bin")),
        ("piece length", Value::Integer(32768)),
        ("pieces", fake_hashes(4)),
    ]);
    assert!(Metainfo::from_bytes(&data).is_err());
}

#[test]
fn test_info_hash_is_stable() {
    let data = build_torrent(vec![
        ("length", Value::Integer(100_000)),
        ("name", bench_str("file.bin")),
        ("piece length", Value::Integer(32768)),
        ("pieces", fake_hashes(4)),
    ]);

    let a = Metainfo::from_bytes(&data).unwrap();
    let b = Metainfo::from_bytes(&data).unwrap();
    assert_eq!(a.info_hash, b.info_hash);
    assert_eq!(a.info_hash.to_hex().len(), 40);
    assert_eq!(a.info_hash.url_encode().len(), 60);
}

#[test]
fn test_piece_size_law() {
    let data = build_torrent(vec![
        ("length", Value::Integer(100_000)),
        ("name", bench_str("file.bin")),
        ("piece length", Value::Integer(32768)),
        ("pieces", fake_hashes(4)),
    ]);
    let info = Metainfo::from_bytes(&data).unwrap().info;

    assert_eq!(info.piece_size(0), 32768);
    assert_eq!(info.piece_size(2), 32768);
    // 100000 - 3 * 32768 = 1696
    assert_eq!(info.piece_size(3), 1696);
    assert_eq!(info.bitfield_len(), 1);
}

#[test]
fn test_trackers_dedup() {
    let mut root = BTreeMap::new();
    root.insert(Bytes::from_static(b"announce"), bench_str("udp://a:1"));
    root.insert(
        Bytes::from_static(b"announce-list"),
        Value::List(vec![
            Value::List(vec![bench_str("udp://a:1"), bench_str("udp://b:2")]),
            Value::List(vec![bench_str("http://c/ann")]),
        ]),
    );
    let mut info = BTreeMap::new();
    info.insert(Bytes::from_static(b"length"), Value::Integer(100));
    info.insert(Bytes::from_static(b"name"), bench_str("x"));
    info.insert(Bytes::from_static(b"piece length"), Value::Integer(64));
    info.insert(
        Bytes::from_static(b"pieces"),
        Value::Bytes(Bytes::from(vec![0u8; 40])),
    );
    root.insert(Bytes::from_static(b"info"), Value::Dict(info));

    let meta = Metainfo::from_bytes(&Value::Dict(root).encode()).unwrap();
    assert_eq!(
        meta.trackers(),
        vec!["udp://a:1", "udp://b:2", "http://c/ann"]
    );
}
