//! The transfer manager: entry point for all four operations
//!
//! A manager owns the process-wide admission gates and hands each operation
//! a handle whose background work starts immediately. Awaiting the handle
//! yields the terminal result; cancelling it cooperatively stops all child
//! work and releases every scoped resource.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::admission::{BucketLimiter, MemoryLimiter};
use crate::batch::{
    self, DownloadBucketInput, DownloadBucketResult, UploadDirectoryInput, UploadDirectoryResult,
};
use crate::client::ObjectClient;
use crate::config::TransferConfig;
use crate::download::{self, DownloadObjectRequest, DownloadObjectResult};
use crate::error::{TransferError, TransferResult};
use crate::upload::{self, UploadObjectRequest, UploadObjectResult};

/// Shared plumbing handed to every task of one operation
#[derive(Clone)]
pub(crate) struct TransferContext {
    pub(crate) client: Arc<dyn ObjectClient>,
    pub(crate) config: TransferConfig,
    pub(crate) buckets: BucketLimiter,
    pub(crate) memory: MemoryLimiter,
    pub(crate) cancel: CancellationToken,
}

impl TransferContext {
    /// Fail with the cancellation sentinel once the handle is cancelled.
    /// Checked before every blocking call and on wake from admission queues.
    pub(crate) fn ensure_active(&self) -> TransferResult<()> {
        if self.cancel.is_cancelled() {
            Err(TransferError::OperationCancelled)
        } else {
            Ok(())
        }
    }
}

/// A running operation
///
/// Work starts when the operation is submitted, not when the handle is
/// awaited. Dropping the handle detaches the operation and lets it run to
/// completion; [`OperationHandle::cancel`] stops it cooperatively.
#[derive(Debug)]
pub struct OperationHandle<T> {
    join: JoinHandle<TransferResult<T>>,
    cancel: CancellationToken,
}

impl<T> OperationHandle<T> {
    /// Request cooperative cancellation of the operation and all its child
    /// tasks. The handle still resolves, reporting how the operation ended.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the operation reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the operation's terminal result
    pub async fn join(self) -> TransferResult<T> {
        match self.join.await {
            Ok(result) => result,
            Err(join_error) if join_error.is_cancelled() => Err(TransferError::OperationCancelled),
            Err(join_error) => Err(TransferError::client(join_error)),
        }
    }
}

/// High-level object transfer engine over an [`ObjectClient`]
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use skyhook::client::InMemoryObjectClient;
/// use skyhook::config::TransferConfig;
/// use skyhook::upload::UploadObjectRequest;
/// use skyhook::TransferManager;
///
/// # async fn example() -> Result<(), skyhook::TransferError> {
/// let client = Arc::new(InMemoryObjectClient::new());
/// let manager = TransferManager::new(client, TransferConfig::default())?;
///
/// let handle = manager.upload_object(UploadObjectRequest::new(
///     "my-bucket",
///     "hello.txt",
///     &b"hello world"[..],
/// ));
/// let result = handle.join().await?;
/// assert_eq!(result.transferred_bytes, 11);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TransferManager {
    client: Arc<dyn ObjectClient>,
    config: TransferConfig,
    buckets: BucketLimiter,
    memory: MemoryLimiter,
}

impl TransferManager {
    /// Create a manager over a client. Validates the configuration and
    /// initializes the admission gates it owns.
    pub fn new(client: Arc<dyn ObjectClient>, config: TransferConfig) -> TransferResult<Self> {
        config.validate()?;
        let buckets = BucketLimiter::new(config.concurrent_task_limit_per_bucket);
        let memory = MemoryLimiter::new(config.max_in_memory_bytes);
        Ok(Self {
            client,
            config,
            buckets,
            memory,
        })
    }

    /// The manager's configuration
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// The per-bucket concurrency gate, exposed for observability
    pub fn bucket_limiter(&self) -> &BucketLimiter {
        &self.buckets
    }

    /// The memory ledger, exposed for observability
    pub fn memory_limiter(&self) -> &MemoryLimiter {
        &self.memory
    }

    fn context(&self) -> (TransferContext, CancellationToken) {
        let cancel = CancellationToken::new();
        (
            TransferContext {
                client: Arc::clone(&self.client),
                config: self.config.clone(),
                buckets: self.buckets.clone(),
                memory: self.memory.clone(),
                cancel: cancel.clone(),
            },
            cancel,
        )
    }

    /// Upload one object. Cancelling the handle aborts any in-flight
    /// multipart upload.
    pub fn upload_object(&self, request: UploadObjectRequest) -> OperationHandle<UploadObjectResult> {
        let (ctx, cancel) = self.context();
        let join = tokio::spawn(upload::upload_object(ctx, request));
        OperationHandle { join, cancel }
    }

    /// Download one object into its sink. Cancelling the handle stops
    /// segment fetches and releases all memory reservations.
    pub fn download_object(
        &self,
        request: DownloadObjectRequest,
    ) -> OperationHandle<DownloadObjectResult> {
        let (ctx, cancel) = self.context();
        let join = tokio::spawn(download::download_object(ctx, request));
        OperationHandle { join, cancel }
    }

    /// Upload a local directory tree. Cancelling the handle cancels every
    /// in-flight per-file upload.
    pub fn upload_directory(
        &self,
        input: UploadDirectoryInput,
    ) -> OperationHandle<UploadDirectoryResult> {
        let (ctx, cancel) = self.context();
        let join = tokio::spawn(batch::upload_directory(ctx, input));
        OperationHandle { join, cancel }
    }

    /// Download a bucket or prefix into a local directory. Cancelling the
    /// handle cancels every in-flight per-object download and removes all
    /// outstanding temp files.
    pub fn download_bucket(
        &self,
        input: DownloadBucketInput,
    ) -> OperationHandle<DownloadBucketResult> {
        let (ctx, cancel) = self.context();
        let join = tokio::spawn(batch::download_bucket(ctx, input));
        OperationHandle { join, cancel }
    }
}
