//! Directory upload: bounded fan-out of per-file uploads over a lazy
//! traversal stream

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;

use super::{DirectoryTally, FailurePolicy};
use crate::error::{TransferError, TransferResult};
use crate::fs::{path_to_key, DirectoryTraverser, FileEntry, DEFAULT_DELIMITER};
use crate::io::BodySource;
use crate::manager::TransferContext;
use crate::progress::DirectoryListener;
use crate::upload::{self, UploadObjectRequest};

/// Request to upload a local directory tree
pub struct UploadDirectoryInput {
    /// Target bucket
    pub bucket: String,
    /// Local directory to upload
    pub source: PathBuf,
    /// Descend into subdirectories
    pub recursive: bool,
    /// Follow symbolic links during traversal
    pub follow_symlinks: bool,
    /// Prefix prepended to every uploaded key
    pub s3_prefix: Option<String>,
    /// Delimiter separating key components
    pub s3_delimiter: String,
    /// Per-file failure handling
    pub failure_policy: FailurePolicy,
    /// Bound on concurrently in-flight per-file uploads
    pub max_concurrency: usize,
    /// Predicate selecting which discovered files upload
    pub filter: Option<Arc<dyn Fn(&FileEntry) -> bool + Send + Sync>>,
    /// Listeners observing the directory tally
    pub directory_listeners: Vec<Arc<dyn DirectoryListener>>,
}

impl UploadDirectoryInput {
    /// Create an input with required fields and default options
    pub fn new(bucket: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            bucket: bucket.into(),
            source: source.into(),
            recursive: true,
            follow_symlinks: false,
            s3_prefix: None,
            s3_delimiter: DEFAULT_DELIMITER.to_string(),
            failure_policy: FailurePolicy::default(),
            max_concurrency: 8,
            filter: None,
            directory_listeners: Vec::new(),
        }
    }

    /// Set whether traversal descends into subdirectories
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set whether traversal follows symbolic links
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
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

    /// Set the per-file failure policy
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the fan-out window
    pub fn max_concurrency(mut self, window: usize) -> Self {
        self.max_concurrency = window;
        self
    }

    /// Set the file filter
    pub fn filter(mut self, filter: impl Fn(&FileEntry) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Attach a directory progress listener
    pub fn directory_listener(mut self, listener: Arc<dyn DirectoryListener>) -> Self {
        self.directory_listeners.push(listener);
        self
    }
}

impl fmt::Debug for UploadDirectoryInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadDirectoryInput")
            .field("bucket", &self.bucket)
            .field("source", &self.source)
            .field("recursive", &self.recursive)
            .field("follow_symlinks", &self.follow_symlinks)
            .field("s3_prefix", &self.s3_prefix)
            .field("failure_policy", &self.failure_policy)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

/// Outcome of a directory upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadDirectoryResult {
    /// Files uploaded successfully
    pub objects_uploaded: u64,
    /// Files that failed (only non-zero under [`FailurePolicy::Ignore`])
    pub objects_failed: u64,
}

pub(crate) async fn upload_directory(
    ctx: TransferContext,
    input: UploadDirectoryInput,
) -> TransferResult<UploadDirectoryResult> {
    let window = input.max_concurrency.max(1);
    let tally = DirectoryTally::new(input.directory_listeners.clone());

    let mut traverser =
        DirectoryTraverser::start(input.source.clone(), input.recursive, input.follow_symlinks);
    let mut children: JoinSet<TransferResult<()>> = JoinSet::new();
    let mut discovery_done = false;
    let mut failure: Option<TransferError> = None;

    loop {
        tokio::select! {
            entry = traverser.next(), if !discovery_done && children.len() < window && failure.is_none() => {
                match entry {
                    None => discovery_done = true,
                    Some(Err(error)) => {
                        // Traversal errors are terminal regardless of policy.
                        failure = Some(error);
                        discovery_done = true;
                        ctx.cancel.cancel();
                    }
                    Some(Ok(entry)) => {
                        if input.filter.as_ref().is_some_and(|f| !f(&entry)) {
                            continue;
                        }
                        match path_to_key(&entry.relative, input.s3_prefix.as_deref(), &input.s3_delimiter) {
                            Ok(key) => {
                                let ctx = ctx.clone();
                                let bucket = input.bucket.clone();
                                children.spawn(async move {
                                    upload_one_file(ctx, bucket, key, entry).await
                                });
                            }
                            Err(error) => {
                                let wrapped = TransferError::FailedToUploadAnObject {
                                    path: entry.path,
                                    source: Box::new(error),
                                };
                                apply_policy(&ctx, input.failure_policy, wrapped, &tally, &mut failure);
                            }
                        }
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

    if let Some(error) = failure {
        return Err(error);
    }
    ctx.ensure_active()?;

    Ok(UploadDirectoryResult {
        objects_uploaded: tally.succeeded(),
        objects_failed: tally.failed(),
    })
}

async fn upload_one_file(
    ctx: TransferContext,
    bucket: String,
    key: String,
    entry: FileEntry,
) -> TransferResult<()> {
    let outcome = async {
        let body = BodySource::from_path(&entry.path).await?;
        let request = UploadObjectRequest::new(bucket, key, body);
        upload::upload_object(ctx, request).await?;
        Ok::<(), TransferError>(())
    }
    .await;

    outcome.map_err(|error| TransferError::FailedToUploadAnObject {
        path: entry.path,
        source: Box::new(error),
    })
}

/// Route a per-file failure through the policy. Cancellation is always
/// terminal; `Ignore` only swallows real per-file errors.
pub(super) fn apply_policy(
    ctx: &TransferContext,
    policy: FailurePolicy,
    error: TransferError,
    tally: &DirectoryTally,
    failure: &mut Option<TransferError>,
) {
    if policy == FailurePolicy::Ignore && !error.is_cancellation() {
        tracing::debug!(error = %error, "continuing past per-object failure");
        tally.record_failure();
        return;
    }
    if failure.is_none() {
        *failure = Some(error);
        ctx.cancel.cancel();
    }
}
