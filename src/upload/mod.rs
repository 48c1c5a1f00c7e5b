//! Single-object upload coordinator
//!
//! Decides between a single `PutObject` and a multipart upload, drives the
//! multipart lifecycle with bounded part fan-out, and guarantees that any
//! failure after `CreateMultipartUpload` releases the upload through exactly
//! one `AbortMultipartUpload` attempt.

mod checksum;
mod plan;

pub use checksum::{ChecksumAlgorithm, ChecksumType};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::client::{
    AbortMultipartUploadInput, CompleteMultipartUploadInput, CompletedPart,
    CreateMultipartUploadInput, PutObjectInput, UploadPartInput,
};
use crate::config::{ChecksumMode, TransferConfig};
use crate::error::{TransferError, TransferResult};
use crate::io::BodySource;
use crate::manager::TransferContext;
use crate::progress::{ProgressTracker, TransferListener};
use plan::UploadPlan;

/// Request to upload one object
pub struct UploadObjectRequest {
    /// Target bucket
    pub bucket: String,
    /// Target key
    pub key: String,
    /// Body to upload; its length must be resolvable up front
    pub body: BodySource,
    /// Per-part checksum algorithm; resolved by priority when unset
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// Caller-computed checksum of the whole object
    pub full_object_checksum: Option<String>,
    /// Content type recorded on the object
    pub content_type: Option<String>,
    /// User-defined metadata
    pub metadata: HashMap<String, String>,
    /// Progress listeners for this operation
    pub listeners: Vec<Arc<dyn TransferListener>>,
}

impl UploadObjectRequest {
    /// Create a request with required fields
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        body: impl Into<BodySource>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            body: body.into(),
            checksum_algorithm: None,
            full_object_checksum: None,
            content_type: None,
            metadata: HashMap::new(),
            listeners: Vec::new(),
        }
    }

    /// Set the per-part checksum algorithm
    pub fn checksum_algorithm(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum_algorithm = Some(algorithm);
        self
    }

    /// Attach a caller-computed whole-object checksum. The value is sent to
    /// the store on the PutObject or CompleteMultipartUpload request and
    /// switches a multipart upload to full-object checksum mode. It must
    /// match the effective checksum algorithm, so pair it with
    /// [`checksum_algorithm`](Self::checksum_algorithm) unless the
    /// priority-selected algorithm is intended.
    pub fn full_object_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.full_object_checksum = Some(checksum.into());
        self
    }

    /// Set the content type
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Add one user metadata entry
    pub fn metadata_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a progress listener
    pub fn listener(mut self, listener: Arc<dyn TransferListener>) -> Self {
        self.listeners.push(listener);
        self
    }
}

impl fmt::Debug for UploadObjectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadObjectRequest")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("body_len", &self.body.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Outcome of a successful upload
#[derive(Debug, Clone, Default)]
pub struct UploadObjectResult {
    /// ETag of the stored object
    pub e_tag: Option<String>,
    /// Multipart upload id, absent for single-PUT uploads
    pub upload_id: Option<String>,
    /// Bytes uploaded
    pub transferred_bytes: u64,
}

/// Run one upload to completion, firing progress hooks on the way
pub(crate) async fn upload_object(
    ctx: TransferContext,
    request: UploadObjectRequest,
) -> TransferResult<UploadObjectResult> {
    let UploadObjectRequest {
        bucket,
        key,
        body,
        checksum_algorithm,
        full_object_checksum,
        content_type,
        metadata,
        listeners,
    } = request;

    let tracker = ProgressTracker::new(listeners, body.len());
    tracker.initiated();

    let result = drive_upload(
        &ctx,
        &tracker,
        &bucket,
        &key,
        body,
        checksum_algorithm,
        full_object_checksum,
        content_type,
        metadata,
    )
    .await;

    match &result {
        Ok(_) => tracker.complete(),
        Err(error) => tracker.failed(error),
    }
    result
}

#[allow(clippy::too_many_arguments)]
async fn drive_upload(
    ctx: &TransferContext,
    tracker: &Arc<ProgressTracker>,
    bucket: &str,
    key: &str,
    body: BodySource,
    checksum_algorithm: Option<ChecksumAlgorithm>,
    full_object_checksum: Option<String>,
    content_type: Option<String>,
    metadata: HashMap<String, String>,
) -> TransferResult<UploadObjectResult> {
    ctx.ensure_active()?;

    let payload_size = body
        .len()
        .ok_or(TransferError::StreamPayloadOfUnknownLength)?;

    if payload_size < ctx.config.multipart_upload_threshold_bytes {
        put_single(
            ctx,
            tracker,
            bucket,
            key,
            body,
            payload_size,
            checksum_algorithm,
            full_object_checksum,
            content_type,
            metadata,
        )
        .await
    } else {
        upload_multipart(
            ctx,
            tracker,
            bucket,
            key,
            body,
            payload_size,
            checksum_algorithm,
            full_object_checksum,
            content_type,
            metadata,
        )
        .await
    }
}

/// Algorithm attached to requests, honoring the configured checksum mode.
/// When nothing is requested, the highest-priority algorithm the client
/// advertises wins. A supplied whole-object checksum always rides with an
/// algorithm, whatever the mode.
fn effective_algorithm(
    config: &TransferConfig,
    requested: Option<ChecksumAlgorithm>,
    offered: &[ChecksumAlgorithm],
    has_full_object_checksum: bool,
) -> Option<ChecksumAlgorithm> {
    if has_full_object_checksum || config.request_checksum_calculation == ChecksumMode::Required {
        Some(requested.unwrap_or_else(|| ChecksumAlgorithm::preferred(offered)))
    } else {
        requested
    }
}

#[allow(clippy::too_many_arguments)]
async fn put_single(
    ctx: &TransferContext,
    tracker: &Arc<ProgressTracker>,
    bucket: &str,
    key: &str,
    body: BodySource,
    payload_size: u64,
    checksum_algorithm: Option<ChecksumAlgorithm>,
    full_object_checksum: Option<String>,
    content_type: Option<String>,
    metadata: HashMap<String, String>,
) -> TransferResult<UploadObjectResult> {
    let data = body.read_part(0, payload_size).await?;
    let algorithm = effective_algorithm(
        &ctx.config,
        checksum_algorithm,
        ctx.client.supported_checksum_algorithms(),
        full_object_checksum.is_some(),
    );

    let permit = ctx.buckets.acquire(bucket).await;
    ctx.ensure_active()?;
    let output = ctx
        .client
        .put_object(PutObjectInput {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body: data,
            content_type,
            metadata,
            checksum_algorithm: algorithm,
            full_object_checksum,
        })
        .await
        .map_err(TransferError::Client)?;
    drop(permit);

    tracker.record(payload_size);
    Ok(UploadObjectResult {
        e_tag: output.e_tag,
        upload_id: None,
        transferred_bytes: payload_size,
    })
}

#[allow(clippy::too_many_arguments)]
async fn upload_multipart(
    ctx: &TransferContext,
    tracker: &Arc<ProgressTracker>,
    bucket: &str,
    key: &str,
    body: BodySource,
    payload_size: u64,
    checksum_algorithm: Option<ChecksumAlgorithm>,
    full_object_checksum: Option<String>,
    content_type: Option<String>,
    metadata: HashMap<String, String>,
) -> TransferResult<UploadObjectResult> {
    let plan = UploadPlan::for_payload(payload_size, ctx.config.target_part_size_bytes);
    let algorithm = effective_algorithm(
        &ctx.config,
        checksum_algorithm,
        ctx.client.supported_checksum_algorithms(),
        full_object_checksum.is_some(),
    );
    let checksum_type = ChecksumType::for_upload(full_object_checksum.as_deref());

    let upload_id = {
        let _permit = ctx.buckets.acquire(bucket).await;
        ctx.ensure_active()?;
        ctx.client
            .create_multipart_upload(CreateMultipartUploadInput {
                bucket: bucket.to_string(),
                key: key.to_string(),
                content_type,
                metadata,
                checksum_algorithm: algorithm,
                checksum_type,
            })
            .await
            .map_err(|source| TransferError::FailedToCreateMultipartUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })?
            .upload_id
    };
    tracing::debug!(
        upload_id = %upload_id,
        num_parts = plan.num_parts,
        part_size = plan.part_size,
        "created multipart upload"
    );

    // Every failure from here on, cancellation included, must release the
    // upload id through exactly one abort attempt.
    match upload_parts_and_complete(
        ctx,
        tracker,
        bucket,
        key,
        &upload_id,
        body,
        plan,
        algorithm,
        full_object_checksum,
    )
    .await
    {
        Ok(output) => Ok(UploadObjectResult {
            e_tag: output,
            upload_id: Some(upload_id),
            transferred_bytes: payload_size,
        }),
        Err(original) => {
            tracing::debug!(upload_id = %upload_id, error = %original, "aborting multipart upload");
            let abort = {
                let _permit = ctx.buckets.acquire(bucket).await;
                ctx.client
                    .abort_multipart_upload(AbortMultipartUploadInput {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                        upload_id,
                    })
                    .await
            };
            match abort {
                Ok(()) => Err(original),
                Err(abort_error) => Err(TransferError::FailedToAbortMultipartUpload {
                    original: Box::new(original),
                    abort_error,
                }),
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn upload_parts_and_complete(
    ctx: &TransferContext,
    tracker: &Arc<ProgressTracker>,
    bucket: &str,
    key: &str,
    upload_id: &str,
    body: BodySource,
    plan: UploadPlan,
    algorithm: Option<ChecksumAlgorithm>,
    full_object_checksum: Option<String>,
) -> TransferResult<Option<String>> {
    let mut completed: Vec<CompletedPart> = Vec::with_capacity(plan.num_parts as usize);
    let batch = ctx.config.concurrent_task_limit_per_bucket as u64;

    let mut next_part = 1u64;
    while next_part <= plan.num_parts {
        ctx.ensure_active()?;
        let batch_end = plan.num_parts.min(next_part + batch - 1);

        let mut tasks = Vec::with_capacity((batch_end - next_part + 1) as usize);
        for part_number in next_part..=batch_end {
            let ctx = ctx.clone();
            let tracker = Arc::clone(tracker);
            let body = body.clone();
            let bucket = bucket.to_string();
            let key = key.to_string();
            let upload_id = upload_id.to_string();
            tasks.push(tokio::spawn(async move {
                upload_one_part(
                    &ctx, &tracker, &bucket, &key, &upload_id, &body, plan, algorithm,
                    part_number,
                )
                .await
            }));
        }

        // Always drain the whole batch so no part task outlives the abort.
        let mut first_error = None;
        for task in tasks {
            match task.await {
                Ok(Ok(part)) => completed.push(part),
                Ok(Err(error)) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
                Err(join_error) => {
                    if first_error.is_none() {
                        first_error = Some(TransferError::client(join_error));
                    }
                }
            }
        }
        if let Some(error) = first_error {
            return Err(error);
        }

        next_part = batch_end + 1;
    }

    // The Complete call is position-sensitive: parts sorted ascending, no
    // gaps, no duplicates, exactly num_parts entries.
    completed.sort_by_key(|part| part.part_number);
    if completed.len() as u64 != plan.num_parts {
        return Err(TransferError::IncorrectNumberOfUploadedParts {
            expected: plan.num_parts,
            actual: completed.len() as u64,
        });
    }
    for (index, part) in completed.iter().enumerate() {
        if part.part_number as u64 != index as u64 + 1 {
            return Err(TransferError::IncorrectNumberOfUploadedParts {
                expected: plan.num_parts,
                actual: completed.len() as u64,
            });
        }
    }

    let output = {
        let _permit = ctx.buckets.acquire(bucket).await;
        ctx.ensure_active()?;
        ctx.client
            .complete_multipart_upload(CompleteMultipartUploadInput {
                bucket: bucket.to_string(),
                key: key.to_string(),
                upload_id: upload_id.to_string(),
                parts: completed,
                checksum_algorithm: algorithm,
                full_object_checksum,
            })
            .await
            .map_err(TransferError::Client)?
    };
    tracing::debug!(upload_id = %upload_id, "completed multipart upload");

    Ok(output.e_tag)
}

#[allow(clippy::too_many_arguments)]
async fn upload_one_part(
    ctx: &TransferContext,
    tracker: &Arc<ProgressTracker>,
    bucket: &str,
    key: &str,
    upload_id: &str,
    body: &BodySource,
    plan: UploadPlan,
    algorithm: Option<ChecksumAlgorithm>,
    part_number: u64,
) -> TransferResult<CompletedPart> {
    let permit = ctx.buckets.acquire(bucket).await;
    ctx.ensure_active()?;

    let offset = plan.part_offset(part_number);
    let size = plan.size_of_part(part_number);
    let data = body.read_part(offset, size).await?;

    let output = ctx
        .client
        .upload_part(UploadPartInput {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            part_number: part_number as i32,
            body: data,
            checksum_algorithm: algorithm,
        })
        .await
        .map_err(TransferError::Client)?;
    drop(permit);

    tracker.record(size);
    Ok(CompletedPart {
        part_number: part_number as i32,
        e_tag: output.e_tag,
        checksum: output.checksum,
    })
}
