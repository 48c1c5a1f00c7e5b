//! Single-object download coordinator
//!
//! Concurrency shortens wall time for large objects while the sink observes
//! bytes strictly in file order. After the triage request, remaining
//! segments are fetched in memory-reserved batches, reordered, and drained
//! to the sink in ascending index order.

mod sequencer;
mod triage;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::client::GetObjectInput;
use crate::error::{TransferError, TransferResult};
use crate::io::ByteSink;
use crate::manager::TransferContext;
use crate::progress::{ProgressTracker, TransferListener};
use sequencer::Sequencer;
use triage::{select_strategy, DownloadPlan, DownloadStrategy};

/// Request to download one object into a sink
pub struct DownloadObjectRequest {
    /// Source bucket
    pub bucket: String,
    /// Source key
    pub key: String,
    /// Where the object's bytes go
    pub sink: ByteSink,
    /// Download a single part of a multipart-uploaded object
    pub part_number: Option<i32>,
    /// Download a byte range, `bytes=<start>-[<end>]`
    pub range: Option<String>,
    /// Progress listeners for this operation
    pub listeners: Vec<Arc<dyn TransferListener>>,
}

impl DownloadObjectRequest {
    /// Create a request with required fields
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, sink: ByteSink) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            sink,
            part_number: None,
            range: None,
            listeners: Vec::new(),
        }
    }

    /// Restrict the download to one part
    pub fn part_number(mut self, part: i32) -> Self {
        self.part_number = Some(part);
        self
    }

    /// Restrict the download to a byte range
    pub fn range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    /// Attach a progress listener
    pub fn listener(mut self, listener: Arc<dyn TransferListener>) -> Self {
        self.listeners.push(listener);
        self
    }
}

impl fmt::Debug for DownloadObjectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadObjectRequest")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("part_number", &self.part_number)
            .field("range", &self.range)
            .finish()
    }
}

/// Outcome of a successful download
#[derive(Debug, Clone, Default)]
pub struct DownloadObjectResult {
    /// Bytes delivered to the sink
    pub transferred_bytes: u64,
    /// Object size discovered during the transfer, when known
    pub object_size: Option<u64>,
    /// ETag observed on the object
    pub e_tag: Option<String>,
    /// The accumulated body, for memory sinks
    pub body: Option<Bytes>,
}

/// Run one download to completion, firing progress hooks on the way
pub(crate) async fn download_object(
    ctx: TransferContext,
    request: DownloadObjectRequest,
) -> TransferResult<DownloadObjectResult> {
    let DownloadObjectRequest {
        bucket,
        key,
        mut sink,
        part_number,
        range,
        listeners,
    } = request;

    // Total bytes are unknown until triage discovers the object size.
    let tracker = ProgressTracker::new(listeners, None);
    tracker.initiated();

    let outcome = drive_download(
        &ctx,
        &tracker,
        &mut sink,
        &bucket,
        &key,
        part_number,
        range.as_deref(),
    )
    .await;

    match outcome {
        Ok((transferred_bytes, object_size, e_tag)) => {
            tracker.complete();
            Ok(DownloadObjectResult {
                transferred_bytes,
                object_size,
                e_tag,
                body: sink.into_bytes(),
            })
        }
        Err(error) => {
            tracker.failed(&error);
            Err(error)
        }
    }
}

async fn drive_download(
    ctx: &TransferContext,
    tracker: &Arc<ProgressTracker>,
    sink: &mut ByteSink,
    bucket: &str,
    key: &str,
    part_number: Option<i32>,
    range: Option<&str>,
) -> TransferResult<(u64, Option<u64>, Option<String>)> {
    ctx.ensure_active()?;

    let strategy = select_strategy(part_number, range, ctx.config.multipart_download_type)?;
    match strategy {
        DownloadStrategy::SinglePart(part) => {
            let input = GetObjectInput {
                bucket: bucket.to_string(),
                key: key.to_string(),
                part_number: Some(part),
                checksum_validation: ctx.config.response_checksum_validation,
                ..GetObjectInput::default()
            };
            single_get(ctx, tracker, sink, input).await
        }
        DownloadStrategy::SingleRange(range) => {
            let input = GetObjectInput {
                bucket: bucket.to_string(),
                key: key.to_string(),
                range: Some(range.to_string()),
                checksum_validation: ctx.config.response_checksum_validation,
                ..GetObjectInput::default()
            };
            single_get(ctx, tracker, sink, input).await
        }
        DownloadStrategy::PartSplit => {
            let (first, plan) = triage::triage_by_part(ctx, bucket, key).await?;
            multi_segment(ctx, tracker, sink, bucket, key, first.body, plan).await
        }
        DownloadStrategy::RangeSplit { start, end } => {
            let (first, plan) = triage::triage_by_range(
                ctx,
                bucket,
                key,
                start,
                end,
                ctx.config.target_part_size_bytes,
            )
            .await?;
            multi_segment(ctx, tracker, sink, bucket, key, first.body, plan).await
        }
    }
}

/// Serve the whole request with one GET
async fn single_get(
    ctx: &TransferContext,
    tracker: &Arc<ProgressTracker>,
    sink: &mut ByteSink,
    input: GetObjectInput,
) -> TransferResult<(u64, Option<u64>, Option<String>)> {
    let output = {
        let _permit = ctx.buckets.acquire(&input.bucket).await;
        ctx.ensure_active()?;
        ctx.client
            .get_object(input)
            .await
            .map_err(TransferError::Client)?
    };

    // A partial response's content length is only the slice; the total
    // after the slash in Content-Range is the object size.
    let object_size = match &output.content_range {
        Some(header) => header
            .parse::<crate::header::ContentRange>()
            .map(|cr| cr.total)
            .unwrap_or(output.content_length),
        None => output.content_length,
    };

    let len = output.body.len() as u64;
    tracker.set_total(len);
    sink.write_chunk(output.body).await?;
    tracker.record(len);
    sink.flush().await?;

    Ok((len, Some(object_size), output.e_tag))
}

/// Fan out the remaining segments in memory-reserved batches and drain them
/// to the sink strictly in order
async fn multi_segment(
    ctx: &TransferContext,
    tracker: &Arc<ProgressTracker>,
    sink: &mut ByteSink,
    bucket: &str,
    key: &str,
    first_chunk: Bytes,
    plan: DownloadPlan,
) -> TransferResult<(u64, Option<u64>, Option<String>)> {
    tracker.set_total(plan.total_transfer_bytes);

    let mut transferred = first_chunk.len() as u64;
    sink.write_chunk(first_chunk).await?;
    tracker.record(transferred);

    if plan.num_remaining == 0 {
        sink.flush().await?;
        return Ok((transferred, Some(plan.object_size), plan.validator_tag));
    }

    let limit = ctx.config.concurrent_task_limit_per_bucket as u64;
    let batch_size = (ctx.config.max_in_memory_bytes / plan.segment_size)
        .min(limit)
        .max(1);

    let mut received_total = 0u64;
    let mut next_index = 1u64;
    while next_index <= plan.num_remaining {
        ctx.ensure_active()?;
        let batch_end = plan.num_remaining.min(next_index + batch_size - 1);
        let count = batch_end - next_index + 1;

        // The whole batch's buffers are admitted up front and released only
        // after every segment in it has drained to the sink.
        let reservation = ctx.memory.reserve(count * plan.segment_size).await;

        let (tx, mut rx) = mpsc::channel::<(u64, TransferResult<Bytes>)>(count as usize);
        for index in next_index..=batch_end {
            let input = plan.segment_input(bucket, key, index);
            let expected_len = plan.expected_segment_len(index);
            let ctx = ctx.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = fetch_segment(&ctx, input, expected_len).await;
                // A dropped receiver means the batch already failed.
                let _ = tx.send((index, result)).await;
            });
        }
        drop(tx);

        let mut sequencer = Sequencer::new(next_index);
        let mut batch_error: Option<TransferError> = None;
        while let Some((index, result)) = rx.recv().await {
            match result {
                Ok(data) => {
                    if batch_error.is_none() {
                        sequencer.push(index, data);
                        while let Some((_, chunk)) = sequencer.pop_ready() {
                            let len = chunk.len() as u64;
                            sink.write_chunk(chunk).await?;
                            tracker.record(len);
                            transferred += len;
                            received_total += 1;
                        }
                    }
                }
                Err(error) => {
                    if batch_error.is_none() {
                        batch_error = Some(error);
                    }
                }
            }
        }
        if let Some(error) = batch_error {
            return Err(error);
        }
        if !sequencer.is_empty() {
            // A segment arrived whose index never became drainable.
            return Err(TransferError::UnexpectedNumberOfSegmentsDownloaded {
                expected: plan.num_remaining,
                actual: received_total,
            });
        }

        drop(reservation);
        next_index = batch_end + 1;
    }

    if received_total != plan.num_remaining {
        return Err(TransferError::UnexpectedNumberOfSegmentsDownloaded {
            expected: plan.num_remaining,
            actual: received_total,
        });
    }

    sink.flush().await?;
    Ok((transferred, Some(plan.object_size), plan.validator_tag))
}

async fn fetch_segment(
    ctx: &TransferContext,
    input: GetObjectInput,
    expected_len: Option<u64>,
) -> TransferResult<Bytes> {
    let _permit = ctx.buckets.acquire(&input.bucket).await;
    ctx.ensure_active()?;

    let output = ctx
        .client
        .get_object(input)
        .await
        .map_err(TransferError::Client)?;

    if let Some(expected) = expected_len {
        if output.body.len() as u64 != expected {
            return Err(TransferError::FailedToReadResponseBody(format!(
                "segment truncated: expected {} bytes, got {}",
                expected,
                output.body.len()
            )));
        }
    }

    Ok(output.body)
}
