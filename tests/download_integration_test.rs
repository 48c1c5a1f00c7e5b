//! End-to-end download scenarios against the in-memory object client

use std::sync::Arc;

use bytes::Bytes;

use skyhook::client::{CallRecord, InMemoryObjectClient};
use skyhook::config::{MultipartDownloadType, TransferConfig};
use skyhook::download::DownloadObjectRequest;
use skyhook::io::ByteSink;
use skyhook::TransferManager;

const MEBI: u64 = 1024 * 1024;

fn payload(len: usize) -> Bytes {
    let data: Vec<u8> = (0..len).map(|i| (i % 239) as u8).collect();
    Bytes::from(data)
}

fn get_calls(calls: &[CallRecord]) -> Vec<&CallRecord> {
    calls
        .iter()
        .filter(|c| matches!(c, CallRecord::GetObject { .. }))
        .collect()
}

#[tokio::test]
async fn test_by_part_small_object_is_one_get() {
    let client = Arc::new(InMemoryObjectClient::new());
    let body = payload(4096);
    client.insert_object("bucket", "small.bin", body.clone());

    let manager = TransferManager::new(client.clone(), TransferConfig::default()).unwrap();
    let handle = manager.download_object(DownloadObjectRequest::new(
        "bucket",
        "small.bin",
        ByteSink::memory(),
    ));
    let result = handle.join().await.unwrap();

    assert_eq!(result.transferred_bytes, 4096);
    assert_eq!(result.body.unwrap(), body);

    let calls = client.calls();
    let gets = get_calls(&calls);
    assert_eq!(gets.len(), 1);
    assert!(matches!(
        gets[0],
        CallRecord::GetObject {
            part_number: Some(1),
            ..
        }
    ));
}

#[tokio::test]
async fn test_by_part_multi_part_object_pins_etag() {
    let client = Arc::new(InMemoryObjectClient::new());
    let parts = vec![payload(1000), payload(1000), payload(300)];
    let whole: Bytes = {
        let mut all = Vec::new();
        for part in &parts {
            all.extend_from_slice(part);
        }
        Bytes::from(all)
    };
    client.insert_object_with_parts("bucket", "parts.bin", parts);

    let manager = TransferManager::new(client.clone(), TransferConfig::default()).unwrap();
    let handle = manager.download_object(DownloadObjectRequest::new(
        "bucket",
        "parts.bin",
        ByteSink::memory(),
    ));
    let result = handle.join().await.unwrap();

    assert_eq!(result.body.unwrap(), whole);
    assert_eq!(result.object_size, Some(2300));

    let calls = client.calls();
    let gets = get_calls(&calls);
    assert_eq!(gets.len(), 3);

    // Triage is unpinned; every later part request carries If-Match with
    // the triage ETag.
    match gets[0] {
        CallRecord::GetObject {
            part_number: Some(1),
            if_match: None,
            ..
        } => {}
        other => panic!("unexpected triage call {other:?}"),
    }
    for get in &gets[1..] {
        match get {
            CallRecord::GetObject {
                part_number: Some(n),
                if_match: Some(_),
                ..
            } => assert!(*n == 2 || *n == 3),
            other => panic!("unexpected segment call {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_by_range_25_mib_object_scenario() {
    let client = Arc::new(InMemoryObjectClient::new());
    let body = payload((25 * MEBI) as usize);
    client.insert_object("bucket", "big.bin", body.clone());

    let config = TransferConfig::builder()
        .multipart_download_type(MultipartDownloadType::ByRange)
        .target_part_size_bytes(10 * MEBI)
        .build()
        .unwrap();
    let manager = TransferManager::new(client.clone(), config).unwrap();

    let handle = manager.download_object(DownloadObjectRequest::new(
        "bucket",
        "big.bin",
        ByteSink::memory(),
    ));
    let result = handle.join().await.unwrap();

    assert_eq!(result.transferred_bytes, 25 * MEBI);
    assert_eq!(result.object_size, Some(25 * MEBI));
    assert_eq!(result.body.unwrap(), body);

    let calls = client.calls();
    let ranges: Vec<(Option<String>, Option<String>)> = get_calls(&calls)
        .iter()
        .map(|c| match c {
            CallRecord::GetObject {
                range, if_match, ..
            } => (range.clone(), if_match.clone()),
            _ => unreachable!(),
        })
        .collect();

    assert_eq!(ranges.len(), 3);
    assert_eq!(ranges[0].0.as_deref(), Some("bytes=0-10485759"));
    assert_eq!(ranges[0].1, None);

    // Concurrent segment requests may land in either order.
    let mut tail: Vec<&str> = ranges[1..]
        .iter()
        .map(|(r, _)| r.as_deref().unwrap())
        .collect();
    tail.sort();
    assert_eq!(tail, vec!["bytes=10485760-20971519", "bytes=20971520-26214399"]);
    assert!(ranges[1..].iter().all(|(_, if_match)| if_match.is_some()));
}

#[tokio::test]
async fn test_explicit_range_with_by_part_config_is_single_get() {
    let client = Arc::new(InMemoryObjectClient::new());
    let body = payload(100);
    client.insert_object("bucket", "ranged.bin", body.clone());

    let manager = TransferManager::new(client.clone(), TransferConfig::default()).unwrap();
    let handle = manager.download_object(
        DownloadObjectRequest::new("bucket", "ranged.bin", ByteSink::memory()).range("bytes=2-5"),
    );
    let result = handle.join().await.unwrap();

    assert_eq!(result.body.unwrap(), body.slice(2..6));
    assert_eq!(get_calls(&client.calls()).len(), 1);
}

#[tokio::test]
async fn test_explicit_part_number_is_single_get() {
    let client = Arc::new(InMemoryObjectClient::new());
    let parts = vec![payload(50), payload(20)];
    let second = parts[1].clone();
    client.insert_object_with_parts("bucket", "parts.bin", parts);

    let manager = TransferManager::new(client.clone(), TransferConfig::default()).unwrap();
    let handle = manager.download_object(
        DownloadObjectRequest::new("bucket", "parts.bin", ByteSink::memory()).part_number(2),
    );
    let result = handle.join().await.unwrap();

    assert_eq!(result.body.unwrap(), second);
    assert_eq!(get_calls(&client.calls()).len(), 1);
}

#[tokio::test]
async fn test_open_range_learns_end_from_triage() {
    let client = Arc::new(InMemoryObjectClient::new());
    let body = payload(20);
    client.insert_object("bucket", "open.bin", body.clone());

    let config = TransferConfig::builder()
        .multipart_download_type(MultipartDownloadType::ByRange)
        .target_part_size_bytes(8)
        .build()
        .unwrap();
    let manager = TransferManager::new(client.clone(), config).unwrap();

    let handle = manager.download_object(
        DownloadObjectRequest::new("bucket", "open.bin", ByteSink::memory()).range("bytes=5-"),
    );
    let result = handle.join().await.unwrap();

    assert_eq!(result.body.unwrap(), body.slice(5..));

    let calls = client.calls();
    let ranges: Vec<String> = get_calls(&calls)
        .iter()
        .filter_map(|c| match c {
            CallRecord::GetObject { range, .. } => range.clone(),
            _ => None,
        })
        .collect();
    // Triage covers bytes 5-12; the second request is clamped to the end.
    assert_eq!(ranges[0], "bytes=5-12");
    assert_eq!(ranges[1], "bytes=13-19");
}

#[tokio::test]
async fn test_download_to_file_sink() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");

    let client = Arc::new(InMemoryObjectClient::new());
    let parts = vec![payload(800), payload(800), payload(100)];
    let whole: Vec<u8> = parts.iter().flat_map(|p| p.to_vec()).collect();
    client.insert_object_with_parts("bucket", "file.bin", parts);

    let manager = TransferManager::new(client, TransferConfig::default()).unwrap();
    let file = tokio::fs::File::create(&path).await.unwrap();
    let handle = manager.download_object(DownloadObjectRequest::new(
        "bucket",
        "file.bin",
        ByteSink::file(file),
    ));
    handle.join().await.unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), whole);
}

#[tokio::test]
async fn test_memory_ledger_and_bucket_queue_drain_to_zero() {
    let client = Arc::new(InMemoryObjectClient::new());
    let body = payload(100);
    client.insert_object("bucket", "drain.bin", body.clone());

    // Segment size 10 with a 20-byte budget forces several two-segment
    // batches, each with its own reservation.
    let config = TransferConfig::builder()
        .multipart_download_type(MultipartDownloadType::ByRange)
        .target_part_size_bytes(10)
        .max_in_memory_bytes(20)
        .build()
        .unwrap();
    let manager = TransferManager::new(client, config).unwrap();

    let handle = manager.download_object(DownloadObjectRequest::new(
        "bucket",
        "drain.bin",
        ByteSink::memory(),
    ));
    let result = handle.join().await.unwrap();

    assert_eq!(result.body.unwrap(), body);
    assert_eq!(manager.memory_limiter().in_use(), 0);
    assert!(manager.bucket_limiter().is_idle());
}

#[tokio::test]
async fn test_missing_object_fails() {
    let client = Arc::new(InMemoryObjectClient::new());
    let manager = TransferManager::new(client, TransferConfig::default()).unwrap();

    let handle = manager.download_object(DownloadObjectRequest::new(
        "bucket",
        "absent.bin",
        ByteSink::memory(),
    ));
    assert!(handle.join().await.is_err());
}
