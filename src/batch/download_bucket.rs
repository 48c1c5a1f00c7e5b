//! Bucket/prefix download: progressive discovery, bounded fan-out, and
//! atomic finalization
//!
//! Discovery paginates the bucket listing concurrently with downloading.
//! Every object downloads into a temp sibling that is atomically renamed on
//! success; on a fail-fast error all outstanding temp files are swept away
//! so failed objects leave no artifact under their final paths.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::fs;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::upload_dir::apply_policy;
use super::{DirectoryTally, FailurePolicy};
use crate::client::{ListObjectsInput, ObjectSummary};
use crate::download::{self, DownloadObjectRequest};
use crate::error::{TransferError, TransferResult};
use crate::fs::{key_to_relative_path, TempFile, DEFAULT_DELIMITER};
use crate::io::ByteSink;
use crate::manager::TransferContext;
use crate::progress::DirectoryListener;

/// Request to download a bucket or prefix into a local directory
pub struct DownloadBucketInput {
    /// Source bucket
    pub bucket: String,
    /// Local directory receiving the objects
    pub destination: PathBuf,
    /// Only download keys under this prefix; also stripped from local paths
    pub s3_prefix: Option<String>,
    /// Delimiter separating key components
    pub s3_delimiter: String,
    /// Predicate selecting which listed objects download
    pub filter: Option<Arc<dyn Fn(&ObjectSummary) -> bool + Send + Sync>>,
    /// Per-object failure handling
    pub failure_policy: FailurePolicy,
    /// Bound on concurrently in-flight per-object downloads
    pub max_concurrency: usize,
    /// Listeners observing the directory tally
    pub directory_listeners: Vec<Arc<dyn DirectoryListener>>,
}

impl DownloadBucketInput {
    /// Create an input with required fields and default options
    pub fn new(bucket: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            bucket: bucket.into(),
            destination: destination.into(),
            s3_prefix: None,
            s3_delimiter: DEFAULT_DELIMITER.to_string(),
            filter: None,
            failure_policy: FailurePolicy::default(),
            max_concurrency: 8,
            directory_listeners: Vec::new(),
        }
    }

    /// Set the key prefix
    pub fn s3_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.s3_prefix = Some(prefix.into());
        self
    }

    /// Set the key delimiter
    pub fn s3_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.s3_delimiter = delimiter.into();
        self
    }

    /// Set the object filter
    pub fn filter(
        mut self,
        filter: impl Fn(&ObjectSummary) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Set the per-object failure policy
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the fan-out window
    pub fn max_concurrency(mut self, window: usize) -> Self {
        self.max_concurrency = window;
        self
    }

    /// Attach a directory progress listener
    pub fn directory_listener(mut self, listener: Arc<dyn DirectoryListener>) -> Self {
        self.directory_listeners.push(listener);
        self
    }
}

impl fmt::Debug for DownloadBucketInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadBucketInput")
            .field("bucket", &self.bucket)
            .field("destination", &self.destination)
            .field("s3_prefix", &self.s3_prefix)
            .field("failure_policy", &self.failure_policy)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

/// Outcome of a bucket download
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadBucketResult {
    /// Objects downloaded and committed to their final paths
    pub objects_downloaded: u64,
    /// Objects that failed (only non-zero under [`FailurePolicy::Ignore`])
    pub objects_failed: u64,
}

type TempRegistry = Arc<Mutex<HashSet<PathBuf>>>;

pub(crate) async fn download_bucket(
    ctx: TransferContext,
    input: DownloadBucketInput,
) -> TransferResult<DownloadBucketResult> {
    match fs::metadata(&input.destination).await {
        Ok(meta) if !meta.is_dir() => {
            return Err(TransferError::ProvidedDestinationIsNotADirectory(
                input.destination,
            ));
        }
        Ok(_) => {}
        Err(_) => {
            fs::create_dir_all(&input.destination).await.map_err(|source| {
                TransferError::FailedToCreateDestinationDirectory {
                    path: input.destination.clone(),
                    source,
                }
            })?;
        }
    }

    let window = input.max_concurrency.max(1);
    let tally = DirectoryTally::new(input.directory_listeners.clone());
    let registry: TempRegistry = Arc::new(Mutex::new(HashSet::new()));

    // Discovery runs concurrently with downloading, feeding (key, temp)
    // pairs through a bounded channel.
    let (tx, mut rx) = mpsc::channel::<TransferResult<(String, TempFile)>>(window * 2);
    let discovery = {
        let ctx = ctx.clone();
        let registry = Arc::clone(&registry);
        let bucket = input.bucket.clone();
        let prefix = input.s3_prefix.clone();
        let delimiter = input.s3_delimiter.clone();
        let destination = input.destination.clone();
        let filter = input.filter.clone();
        tokio::spawn(async move {
            if let Err(error) =
                discover(&ctx, &bucket, prefix, &delimiter, &destination, filter, &registry, &tx)
                    .await
            {
                let _ = tx.send(Err(error)).await;
            }
        })
    };

    let mut children: JoinSet<TransferResult<()>> = JoinSet::new();
    let mut discovery_done = false;
    let mut failure: Option<TransferError> = None;

    loop {
        tokio::select! {
            item = rx.recv(), if !discovery_done && children.len() < window && failure.is_none() => {
                match item {
                    None => discovery_done = true,
                    Some(Err(error)) => {
                        failure = Some(error);
                        discovery_done = true;
                        ctx.cancel.cancel();
                    }
                    Some(Ok((key, temp))) => {
                        let ctx = ctx.clone();
                        let bucket = input.bucket.clone();
                        let registry = Arc::clone(&registry);
                        children.spawn(async move {
                            download_one_object(ctx, bucket, key, temp, registry).await
                        });
                    }
                }
            }
            result = children.join_next(), if !children.is_empty() => {
                match result {
                    Some(Ok(Ok(()))) => tally.record_success(),
                    Some(Ok(Err(error))) => {
                        apply_policy(&ctx, input.failure_policy, error, &tally, &mut failure);
                    }
                    Some(Err(join_error)) => {
                        apply_policy(
                            &ctx,
                            input.failure_policy,
                            TransferError::client(join_error),
                            &tally,
                            &mut failure,
                        );
                    }
                    None => {}
                }
            }
            else => break,
        }
    }

    // Closing the channel unblocks a discovery task parked on send; wait
    // for it to settle so the registry holds every temp file it created,
    // then drain whatever the downloader never claimed.
    rx.close();
    let _ = discovery.await;
    while rx.try_recv().is_ok() {}

    if let Some(error) = failure {
        sweep_temp_files(&registry).await;
        return Err(error);
    }
    if ctx.cancel.is_cancelled() {
        sweep_temp_files(&registry).await;
        return Err(TransferError::OperationCancelled);
    }

    Ok(DownloadBucketResult {
        objects_downloaded: tally.succeeded(),
        objects_failed: tally.failed(),
    })
}

#[allow(clippy::too_many_arguments)]
async fn discover(
    ctx: &TransferContext,
    bucket: &str,
    prefix: Option<String>,
    delimiter: &str,
    destination: &std::path::Path,
    filter: Option<Arc<dyn Fn(&ObjectSummary) -> bool + Send + Sync>>,
    registry: &TempRegistry,
    tx: &mpsc::Sender<TransferResult<(String, TempFile)>>,
) -> TransferResult<()> {
    let mut continuation_token: Option<String> = None;

    loop {
        ctx.ensure_active()?;
        let page = {
            let _permit = ctx.buckets.acquire(bucket).await;
            ctx.client
                .list_objects_v2(ListObjectsInput {
                    bucket: bucket.to_string(),
                    prefix: prefix.clone(),
                    continuation_token: continuation_token.take(),
                    max_keys: None,
                })
                .await
                .map_err(TransferError::Client)?
        };

        for object in page.objects {
            if filter.as_ref().is_some_and(|f| !f(&object)) {
                continue;
            }
            // Folder placeholders and traversal escapes are skipped here.
            let Some(relative) = key_to_relative_path(&object.key, prefix.as_deref(), delimiter)
            else {
                continue;
            };

            let final_path = destination.join(relative);
            if let Some(parent) = final_path.parent() {
                fs::create_dir_all(parent).await.map_err(|source| {
                    TransferError::FailedToCreateNestedDestinationDirectory {
                        path: parent.to_path_buf(),
                        source,
                    }
                })?;
            }

            let temp = TempFile::create(final_path).await?;
            registry
                .lock()
                .unwrap()
                .insert(temp.temp_path().to_path_buf());

            if tx.send(Ok((object.key, temp))).await.is_err() {
                // Downloader gave up; its cleanup owns the registry now.
                return Ok(());
            }
        }

        if !page.is_truncated {
            return Ok(());
        }
        match page.next_continuation_token {
            Some(token) => continuation_token = Some(token),
            None => return Ok(()),
        }
    }
}

async fn download_one_object(
    ctx: TransferContext,
    bucket: String,
    key: String,
    temp: TempFile,
    registry: TempRegistry,
) -> TransferResult<()> {
    let temp_path = temp.temp_path().to_path_buf();
    let wrap = |error: TransferError, key: &str| TransferError::FailedToDownloadAnObject {
        key: key.to_string(),
        source: Box::new(error),
    };

    let outcome = async {
        let file = fs::OpenOptions::new()
            .write(true)
            .open(temp.temp_path())
            .await?;
        let request = DownloadObjectRequest::new(bucket, key.clone(), ByteSink::file(file));
        download::download_object(ctx, request).await?;
        Ok::<(), TransferError>(())
    }
    .await;

    match outcome {
        Ok(()) => {
            let result = temp.finalize().await;
            registry.lock().unwrap().remove(&temp_path);
            result.map(|_| ()).map_err(|error| wrap(error, &key))
        }
        Err(error) => {
            temp.remove().await;
            registry.lock().unwrap().remove(&temp_path);
            Err(wrap(error, &key))
        }
    }
}

/// Unlink every temp file still registered, best effort
async fn sweep_temp_files(registry: &TempRegistry) {
    let paths: Vec<PathBuf> = registry.lock().unwrap().drain().collect();
    for path in paths {
        if fs::remove_file(&path).await.is_err() {
            tracing::warn!(path = %path.display(), "failed to remove temp file during sweep");
        }
    }
}
