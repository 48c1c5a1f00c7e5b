//! Object-store client capability consumed by the transfer engine
//!
//! The engine drives all network I/O through the [`ObjectClient`] trait, a
//! small capability covering the atomic S3 operations it needs. Retries of
//! individual HTTP calls, signing, and endpoint resolution are the client's
//! responsibility; the engine never retries a call itself.
//!
//! Two implementations ship with the crate:
//!
//! - [`AwsObjectClient`]: backed by `aws-sdk-s3`, for production use.
//! - [`InMemoryObjectClient`]: a process-local store for tests and local
//!   development. Do not use in production.

mod aws;
mod memory;

pub use aws::AwsObjectClient;
pub use memory::{CallRecord, InMemoryObjectClient};

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::ChecksumMode;
use crate::error::ClientError;
use crate::upload::{ChecksumAlgorithm, ChecksumType};

/// Result type for client calls
pub type ClientResult<T> = Result<T, ClientError>;

/// Input for `PutObject`
#[derive(Debug, Clone, Default)]
pub struct PutObjectInput {
    /// Target bucket
    pub bucket: String,
    /// Target key
    pub key: String,
    /// Full object body
    pub body: Bytes,
    /// Content type recorded on the object
    pub content_type: Option<String>,
    /// User-defined metadata
    pub metadata: HashMap<String, String>,
    /// Checksum algorithm the client should compute for the request
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// Caller-computed checksum of the whole body, matching
    /// `checksum_algorithm`. Sent instead of a client-side computation.
    pub full_object_checksum: Option<String>,
}

/// Output of `PutObject`
#[derive(Debug, Clone, Default)]
pub struct PutObjectOutput {
    /// ETag of the stored object
    pub e_tag: Option<String>,
}

/// Input for `CreateMultipartUpload`
#[derive(Debug, Clone)]
pub struct CreateMultipartUploadInput {
    /// Target bucket
    pub bucket: String,
    /// Target key
    pub key: String,
    /// Content type recorded on the object
    pub content_type: Option<String>,
    /// User-defined metadata
    pub metadata: HashMap<String, String>,
    /// Checksum algorithm applied to each part
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// Whether the upload carries a full-object or composite checksum
    pub checksum_type: ChecksumType,
}

/// Output of `CreateMultipartUpload`
#[derive(Debug, Clone)]
pub struct CreateMultipartUploadOutput {
    /// Identifier owning the multipart upload until Complete or Abort
    pub upload_id: String,
}

/// Input for `UploadPart`
#[derive(Debug, Clone)]
pub struct UploadPartInput {
    /// Target bucket
    pub bucket: String,
    /// Target key
    pub key: String,
    /// Multipart upload this part belongs to
    pub upload_id: String,
    /// 1-based part number
    pub part_number: i32,
    /// Part body
    pub body: Bytes,
    /// Checksum algorithm the client should compute for the part
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
}

/// Output of `UploadPart`
#[derive(Debug, Clone)]
pub struct UploadPartOutput {
    /// ETag of the stored part
    pub e_tag: String,
    /// Checksum value for the configured algorithm, when computed
    pub checksum: Option<String>,
}

/// One entry of the part list handed to `CompleteMultipartUpload`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number
    pub part_number: i32,
    /// ETag returned by the corresponding `UploadPart`
    pub e_tag: String,
    /// Checksum value for the configured algorithm, when computed
    pub checksum: Option<String>,
}

/// Input for `CompleteMultipartUpload`. Parts must be sorted by part number
/// ascending with no gaps and no duplicates.
#[derive(Debug, Clone)]
pub struct CompleteMultipartUploadInput {
    /// Target bucket
    pub bucket: String,
    /// Target key
    pub key: String,
    /// Multipart upload being committed
    pub upload_id: String,
    /// Completed parts, sorted ascending by part number
    pub parts: Vec<CompletedPart>,
    /// Algorithm the checksum values belong to
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// Caller-computed checksum of the whole object, matching
    /// `checksum_algorithm`. Commits the upload as a full-object checksum.
    pub full_object_checksum: Option<String>,
}

/// Output of `CompleteMultipartUpload`
#[derive(Debug, Clone, Default)]
pub struct CompleteMultipartUploadOutput {
    /// ETag of the assembled object
    pub e_tag: Option<String>,
}

/// Input for `AbortMultipartUpload`
#[derive(Debug, Clone)]
pub struct AbortMultipartUploadInput {
    /// Target bucket
    pub bucket: String,
    /// Target key
    pub key: String,
    /// Multipart upload being released
    pub upload_id: String,
}

/// Input for `GetObject`
#[derive(Debug, Clone, Default)]
pub struct GetObjectInput {
    /// Source bucket
    pub bucket: String,
    /// Source key
    pub key: String,
    /// Fetch a single part of a multipart-uploaded object
    pub part_number: Option<i32>,
    /// Fetch a byte range, `bytes=<start>-[<end>]`
    pub range: Option<String>,
    /// Fail the request if the object's ETag no longer matches
    pub if_match: Option<String>,
    /// Response-checksum validation policy the client should apply
    pub checksum_validation: ChecksumMode,
}

/// Output of `GetObject`. The body is aggregated; the engine sizes its
/// requests so one response fits a single segment buffer.
#[derive(Debug, Clone)]
pub struct GetObjectOutput {
    /// Response body
    pub body: Bytes,
    /// Length of this response's body
    pub content_length: u64,
    /// `Content-Range` header when the response is partial
    pub content_range: Option<String>,
    /// ETag of the object
    pub e_tag: Option<String>,
    /// Total part count, present on part-number requests
    pub parts_count: Option<i32>,
}

/// Input for one page of `ListObjectsV2`
#[derive(Debug, Clone, Default)]
pub struct ListObjectsInput {
    /// Bucket to list
    pub bucket: String,
    /// Key prefix filter
    pub prefix: Option<String>,
    /// Token returned by the previous page
    pub continuation_token: Option<String>,
    /// Page size cap
    pub max_keys: Option<i32>,
}

/// Summary of one listed object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Object ETag
    pub e_tag: Option<String>,
}

/// One page of `ListObjectsV2` results
#[derive(Debug, Clone, Default)]
pub struct ListObjectsPage {
    /// Objects in this page
    pub objects: Vec<ObjectSummary>,
    /// Token for the next page, when truncated
    pub next_continuation_token: Option<String>,
    /// Whether more pages follow
    pub is_truncated: bool,
}

/// Capability trait over the atomic object-store operations the engine
/// consumes. Implementations must tolerate concurrent calls.
#[async_trait]
pub trait ObjectClient: fmt::Debug + Send + Sync {
    /// Checksum algorithms this client can compute per request. The engine
    /// picks from this set by priority when the caller does not choose one.
    fn supported_checksum_algorithms(&self) -> &'static [ChecksumAlgorithm] {
        &ChecksumAlgorithm::PRIORITY
    }

    /// Store a whole object in one request
    async fn put_object(&self, input: PutObjectInput) -> ClientResult<PutObjectOutput>;

    /// Begin a multipart upload
    async fn create_multipart_upload(
        &self,
        input: CreateMultipartUploadInput,
    ) -> ClientResult<CreateMultipartUploadOutput>;

    /// Upload one part of a multipart upload
    async fn upload_part(&self, input: UploadPartInput) -> ClientResult<UploadPartOutput>;

    /// Commit a multipart upload
    async fn complete_multipart_upload(
        &self,
        input: CompleteMultipartUploadInput,
    ) -> ClientResult<CompleteMultipartUploadOutput>;

    /// Release a multipart upload without committing it
    async fn abort_multipart_upload(&self, input: AbortMultipartUploadInput) -> ClientResult<()>;

    /// Fetch an object, a part of it, or a byte range of it
    async fn get_object(&self, input: GetObjectInput) -> ClientResult<GetObjectOutput>;

    /// Fetch one page of a bucket listing
    async fn list_objects_v2(&self, input: ListObjectsInput) -> ClientResult<ListObjectsPage>;
}
