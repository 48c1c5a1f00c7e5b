//! Error types for transfer operations

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for transfer operations
pub type TransferResult<T> = Result<T, TransferError>;

/// Opaque error produced by an [`ObjectClient`](crate::client::ObjectClient)
/// implementation. The engine never inspects these beyond reporting them.
pub type ClientError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while driving a transfer
#[derive(Error, Debug)]
pub enum TransferError {
    /// The upload body's length could not be resolved up front
    #[error("stream payloads of unknown length are not supported")]
    StreamPayloadOfUnknownLength,

    /// The initial CreateMultipartUpload call failed
    #[error("failed to create multipart upload for {bucket}/{key}")]
    FailedToCreateMultipartUpload {
        /// Target bucket
        bucket: String,
        /// Target key
        key: String,
        /// Underlying client error
        #[source]
        source: ClientError,
    },

    /// A multipart upload could not be aborted after a failure. The original
    /// failure is preserved so it is not masked by the abort error.
    #[error("failed to abort multipart upload after error: {original}")]
    FailedToAbortMultipartUpload {
        /// The failure that triggered the abort
        original: Box<TransferError>,
        /// The error returned by the abort call itself
        abort_error: ClientError,
    },

    /// A part read returned fewer bytes than the plan requires
    #[error("short read for upload part: expected {expected} bytes, got {actual}")]
    PartShortRead {
        /// Bytes the plan asked for
        expected: u64,
        /// Bytes actually read
        actual: u64,
    },

    /// The number of completed parts does not match the upload plan
    #[error("incorrect number of uploaded parts: expected {expected}, got {actual}")]
    IncorrectNumberOfUploadedParts {
        /// Parts the plan requires
        expected: u64,
        /// Parts actually collected
        actual: u64,
    },

    /// A response body could not be read
    #[error("failed to read response body: {0}")]
    FailedToReadResponseBody(String),

    /// A sink write failed hard
    #[error("failed to write to sink: {0}")]
    FailedToWriteSink(String),

    /// The triage response carried no usable Content-Range total
    #[error("failed to determine object size from response")]
    FailedToDetermineObjectSize,

    /// A range header could not be parsed or is unsupported
    #[error("invalid range format: {0}")]
    InvalidRangeFormat(String),

    /// The download received a different number of segments than planned
    #[error("unexpected number of segments downloaded: expected {expected}, got {actual}")]
    UnexpectedNumberOfSegmentsDownloaded {
        /// Segments the plan requires
        expected: u64,
        /// Segments actually received
        actual: u64,
    },

    /// The download destination exists but is not a directory
    #[error("provided destination is not a directory: {0}")]
    ProvidedDestinationIsNotADirectory(PathBuf),

    /// The download destination directory could not be created
    #[error("failed to create destination directory {path}")]
    FailedToCreateDestinationDirectory {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A nested directory under the destination could not be created
    #[error("failed to create nested destination directory {path}")]
    FailedToCreateNestedDestinationDirectory {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The upload source is missing or not traversable
    #[error("invalid source: {0}")]
    InvalidSourceUrl(String),

    /// The engine configuration is unusable
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A local file name cannot be mapped to an object key
    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    /// Wrapper surfacing the offending key to a directory failure policy
    #[error("failed to download object {key}")]
    FailedToDownloadAnObject {
        /// Key of the object that failed
        key: String,
        /// Underlying failure
        #[source]
        source: Box<TransferError>,
    },

    /// Wrapper surfacing the offending file to a directory failure policy
    #[error("failed to upload object from {path}")]
    FailedToUploadAnObject {
        /// Local file that failed
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: Box<TransferError>,
    },

    /// The atomic rename of a completed temp file failed
    #[error("failed to rename temporary file after download: {0}")]
    FailedToRenameTemporaryFileAfterDownload(PathBuf),

    /// The operation was cancelled through its handle
    #[error("operation cancelled")]
    OperationCancelled,

    /// An error returned by the object client
    #[error("object client error")]
    Client(#[source] ClientError),

    /// Local I/O error
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Wrap an opaque client error
    pub fn client<E>(err: E) -> Self
    where
        E: Into<ClientError>,
    {
        TransferError::Client(err.into())
    }

    /// True when the error is the cancellation sentinel, possibly wrapped by
    /// a per-object directory error.
    pub fn is_cancellation(&self) -> bool {
        match self {
            TransferError::OperationCancelled => true,
            TransferError::FailedToDownloadAnObject { source, .. } => source.is_cancellation(),
            TransferError::FailedToUploadAnObject { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }
}
