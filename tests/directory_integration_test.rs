//! End-to-end directory upload and bucket download scenarios

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use skyhook::batch::{DownloadBucketInput, UploadDirectoryInput};
use skyhook::client::InMemoryObjectClient;
use skyhook::config::TransferConfig;
use skyhook::{FailurePolicy, TransferError, TransferManager};

fn temp_siblings(dir: &Path) -> Vec<String> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current).unwrap().flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if entry.file_name().to_string_lossy().contains(".s3tmp.") {
                found.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
    }
    found
}

#[tokio::test]
async fn test_upload_directory_tree() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("sub/inner")).unwrap();
    std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
    std::fs::write(dir.path().join("sub/b.txt"), b"beta").unwrap();
    std::fs::write(dir.path().join("sub/inner/c.txt"), b"gamma").unwrap();

    let client = Arc::new(InMemoryObjectClient::new());
    let manager = TransferManager::new(client.clone(), TransferConfig::default()).unwrap();

    let handle = manager.upload_directory(
        UploadDirectoryInput::new("bucket", dir.path()).s3_prefix("backup"),
    );
    let result = handle.join().await.unwrap();

    assert_eq!(result.objects_uploaded, 3);
    assert_eq!(result.objects_failed, 0);
    assert_eq!(
        client.object("bucket", "backup/a.txt").unwrap(),
        Bytes::from_static(b"alpha")
    );
    assert_eq!(
        client.object("bucket", "backup/sub/b.txt").unwrap(),
        Bytes::from_static(b"beta")
    );
    assert_eq!(
        client.object("bucket", "backup/sub/inner/c.txt").unwrap(),
        Bytes::from_static(b"gamma")
    );
}

#[tokio::test]
async fn test_upload_directory_non_recursive() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("top.txt"), b"1").unwrap();
    std::fs::write(dir.path().join("sub/deep.txt"), b"2").unwrap();

    let client = Arc::new(InMemoryObjectClient::new());
    let manager = TransferManager::new(client.clone(), TransferConfig::default()).unwrap();

    let handle =
        manager.upload_directory(UploadDirectoryInput::new("bucket", dir.path()).recursive(false));
    let result = handle.join().await.unwrap();

    assert_eq!(result.objects_uploaded, 1);
    assert!(client.object("bucket", "top.txt").is_some());
    assert!(client.object("bucket", "sub/deep.txt").is_none());
}

#[tokio::test]
async fn test_upload_directory_filter() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("keep.txt"), b"1").unwrap();
    std::fs::write(dir.path().join("skip.log"), b"2").unwrap();

    let client = Arc::new(InMemoryObjectClient::new());
    let manager = TransferManager::new(client.clone(), TransferConfig::default()).unwrap();

    let handle = manager.upload_directory(
        UploadDirectoryInput::new("bucket", dir.path())
            .filter(|entry| entry.relative.extension().is_some_and(|e| e == "txt")),
    );
    let result = handle.join().await.unwrap();

    assert_eq!(result.objects_uploaded, 1);
    assert!(client.object("bucket", "keep.txt").is_some());
    assert!(client.object("bucket", "skip.log").is_none());
}

#[tokio::test]
async fn test_upload_directory_ignore_policy_tallies_failures() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("good1.txt"), b"1").unwrap();
    std::fs::write(dir.path().join("bad.txt"), b"2").unwrap();
    std::fs::write(dir.path().join("good2.txt"), b"3").unwrap();

    let client = Arc::new(InMemoryObjectClient::new());
    client.fail_put_object("bad.txt");
    let manager = TransferManager::new(client.clone(), TransferConfig::default()).unwrap();

    let handle = manager.upload_directory(
        UploadDirectoryInput::new("bucket", dir.path()).failure_policy(FailurePolicy::Ignore),
    );
    let result = handle.join().await.unwrap();

    assert_eq!(result.objects_uploaded, 2);
    assert_eq!(result.objects_failed, 1);
}

#[tokio::test]
async fn test_upload_directory_rethrow_policy_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.txt"), b"2").unwrap();

    let client = Arc::new(InMemoryObjectClient::new());
    client.fail_put_object("bad.txt");
    let manager = TransferManager::new(client, TransferConfig::default()).unwrap();

    let handle = manager.upload_directory(UploadDirectoryInput::new("bucket", dir.path()));
    let error = handle.join().await.unwrap_err();

    match error {
        TransferError::FailedToUploadAnObject { path, .. } => {
            assert!(path.ends_with("bad.txt"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_download_bucket_commits_finals_and_skips_unsafe_keys() {
    let client = Arc::new(InMemoryObjectClient::new());
    client.insert_object("bucket", "data/a.txt", Bytes::from_static(b"alpha"));
    client.insert_object("bucket", "data/sub/b.txt", Bytes::from_static(b"beta"));
    // Folder placeholder and traversal escape must be skipped.
    client.insert_object("bucket", "data/sub/", Bytes::new());
    client.insert_object("bucket", "data/../../evil.txt", Bytes::from_static(b"evil"));

    let dest = tempfile::tempdir().unwrap();
    let manager = TransferManager::new(client, TransferConfig::default()).unwrap();

    let handle = manager.download_bucket(
        DownloadBucketInput::new("bucket", dest.path()).s3_prefix("data/"),
    );
    let result = handle.join().await.unwrap();

    assert_eq!(result.objects_downloaded, 2);
    assert_eq!(result.objects_failed, 0);
    assert_eq!(
        std::fs::read(dest.path().join("a.txt")).unwrap(),
        b"alpha"
    );
    assert_eq!(
        std::fs::read(dest.path().join("sub/b.txt")).unwrap(),
        b"beta"
    );
    assert!(!dest.path().join("evil.txt").exists());
    assert!(temp_siblings(dest.path()).is_empty());
}

#[tokio::test]
async fn test_download_bucket_atomic_finalize_on_failure() {
    let client = Arc::new(InMemoryObjectClient::new());
    client.insert_object("bucket", "obj/a.txt", Bytes::from_static(b"alpha"));
    client.insert_object("bucket", "obj/b.txt", Bytes::from_static(b"beta"));
    client.insert_object("bucket", "obj/c.txt", Bytes::from_static(b"gamma"));
    // Listing is key-ordered, so with a window of one the first two commit
    // before the third fails.
    client.fail_get_object("obj/c.txt");

    let dest = tempfile::tempdir().unwrap();
    let manager = TransferManager::new(client, TransferConfig::default()).unwrap();

    let handle = manager.download_bucket(
        DownloadBucketInput::new("bucket", dest.path())
            .s3_prefix("obj/")
            .max_concurrency(1),
    );
    let error = handle.join().await.unwrap_err();
    assert!(matches!(
        error,
        TransferError::FailedToDownloadAnObject { .. }
    ));

    // Succeeded objects are the renamed finals; the failed one left no
    // artifact, and no temp files survive anywhere.
    assert_eq!(std::fs::read(dest.path().join("a.txt")).unwrap(), b"alpha");
    assert_eq!(std::fs::read(dest.path().join("b.txt")).unwrap(), b"beta");
    assert!(!dest.path().join("c.txt").exists());
    assert!(temp_siblings(dest.path()).is_empty());
}

#[tokio::test]
async fn test_download_bucket_ignore_policy_continues() {
    let client = Arc::new(InMemoryObjectClient::new());
    client.insert_object("bucket", "k/a.txt", Bytes::from_static(b"alpha"));
    client.insert_object("bucket", "k/b.txt", Bytes::from_static(b"beta"));
    client.fail_get_object("k/a.txt");

    let dest = tempfile::tempdir().unwrap();
    let manager = TransferManager::new(client, TransferConfig::default()).unwrap();

    let handle = manager.download_bucket(
        DownloadBucketInput::new("bucket", dest.path())
            .s3_prefix("k/")
            .failure_policy(FailurePolicy::Ignore),
    );
    let result = handle.join().await.unwrap();

    assert_eq!(result.objects_downloaded, 1);
    assert_eq!(result.objects_failed, 1);
    assert!(!dest.path().join("a.txt").exists());
    assert_eq!(std::fs::read(dest.path().join("b.txt")).unwrap(), b"beta");
    assert!(temp_siblings(dest.path()).is_empty());
}

#[tokio::test]
async fn test_download_bucket_paginates_discovery() {
    let client = Arc::new(InMemoryObjectClient::new());
    for i in 0..5 {
        client.insert_object("bucket", format!("page/{i}.txt"), Bytes::from_static(b"x"));
    }
    client.set_page_size(2);

    let dest = tempfile::tempdir().unwrap();
    let manager = TransferManager::new(client.clone(), TransferConfig::default()).unwrap();

    let handle = manager.download_bucket(
        DownloadBucketInput::new("bucket", dest.path()).s3_prefix("page/"),
    );
    let result = handle.join().await.unwrap();

    assert_eq!(result.objects_downloaded, 5);
    let listings = client
        .calls()
        .iter()
        .filter(|c| matches!(c, skyhook::client::CallRecord::ListObjectsV2 { .. }))
        .count();
    assert!(listings >= 3, "expected multiple listing pages, saw {listings}");
}

#[tokio::test]
async fn test_download_bucket_object_filter() {
    let client = Arc::new(InMemoryObjectClient::new());
    client.insert_object("bucket", "f/keep.txt", Bytes::from_static(b"1"));
    client.insert_object("bucket", "f/skip.log", Bytes::from_static(b"2"));

    let dest = tempfile::tempdir().unwrap();
    let manager = TransferManager::new(client, TransferConfig::default()).unwrap();

    let handle = manager.download_bucket(
        DownloadBucketInput::new("bucket", dest.path())
            .s3_prefix("f/")
            .filter(|object| object.key.ends_with(".txt")),
    );
    let result = handle.join().await.unwrap();

    assert_eq!(result.objects_downloaded, 1);
    assert!(dest.path().join("keep.txt").exists());
    assert!(!dest.path().join("skip.log").exists());
}

#[tokio::test]
async fn test_download_bucket_rejects_file_destination() {
    let file = tempfile::NamedTempFile::new().unwrap();

    let client = Arc::new(InMemoryObjectClient::new());
    let manager = TransferManager::new(client, TransferConfig::default()).unwrap();

    let handle = manager.download_bucket(DownloadBucketInput::new("bucket", file.path()));
    let error = handle.join().await.unwrap_err();
    assert!(matches!(
        error,
        TransferError::ProvidedDestinationIsNotADirectory(_)
    ));
}
