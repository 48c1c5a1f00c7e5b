//! Configuration types for the transfer engine

use serde::{Deserialize, Serialize};

use crate::error::{TransferError, TransferResult};

/// One mebibyte in bytes
pub const MEBI_BYTE: u64 = 1024 * 1024;

/// One gibibyte in bytes
pub const GIBI_BYTE: u64 = 1024 * MEBI_BYTE;

/// Default part size for multipart uploads and download segments (8 MiB)
pub const DEFAULT_PART_SIZE: u64 = 8 * MEBI_BYTE;

/// Default threshold below which uploads use a single PutObject (16 MiB)
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 16 * MEBI_BYTE;

/// Default memory budget for buffered segment data (6 GiB)
pub const DEFAULT_MEMORY_BUDGET: u64 = 6 * GIBI_BYTE;

/// Memory budget suited to mobile-class devices (1 GiB)
pub const MOBILE_MEMORY_BUDGET: u64 = GIBI_BYTE;

/// Memory budget suited to constrained wearable-class devices (100 MiB)
pub const CONSTRAINED_MEMORY_BUDGET: u64 = 100 * MEBI_BYTE;

/// Default number of concurrent in-flight calls per bucket. Mirrors the
/// typical HTTP connection pool limit of the underlying client.
pub const DEFAULT_TASK_LIMIT_PER_BUCKET: usize = 8;

/// How a large object download is split into concurrent requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultipartDownloadType {
    /// `GetObject` with `part_number` set, mirroring the upload's parts
    #[default]
    ByPart,
    /// Ranged `GetObject` requests of `target_part_size_bytes` each
    ByRange,
}

/// When checksums are attached to requests or validated on responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMode {
    /// Always attach/validate
    Required,
    /// Attach/validate only when the operation supports it
    #[default]
    WhenSupported,
}

/// Transfer engine configuration
///
/// # Example
///
/// ```
/// use skyhook::config::{TransferConfig, MultipartDownloadType};
///
/// let config = TransferConfig::builder()
///     .target_part_size_bytes(16 * 1024 * 1024)
///     .multipart_download_type(MultipartDownloadType::ByRange)
///     .build()
///     .unwrap();
/// assert_eq!(config.target_part_size_bytes, 16 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Part size floor for multipart uploads and segment size for downloads
    pub target_part_size_bytes: u64,

    /// Uploads below this size use a single PutObject
    pub multipart_upload_threshold_bytes: u64,

    /// Strategy for splitting large downloads
    pub multipart_download_type: MultipartDownloadType,

    /// When to attach checksums to upload requests
    pub request_checksum_calculation: ChecksumMode,

    /// When to validate checksums on download responses
    pub response_checksum_validation: ChecksumMode,

    /// Global bound on bytes buffered in memory across all transfers
    pub max_in_memory_bytes: u64,

    /// Bound on concurrent in-flight calls sharing a bucket
    pub concurrent_task_limit_per_bucket: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            target_part_size_bytes: DEFAULT_PART_SIZE,
            multipart_upload_threshold_bytes: DEFAULT_MULTIPART_THRESHOLD,
            multipart_download_type: MultipartDownloadType::default(),
            request_checksum_calculation: ChecksumMode::default(),
            response_checksum_validation: ChecksumMode::default(),
            max_in_memory_bytes: DEFAULT_MEMORY_BUDGET,
            concurrent_task_limit_per_bucket: DEFAULT_TASK_LIMIT_PER_BUCKET,
        }
    }
}

impl TransferConfig {
    /// Create a builder with default values
    pub fn builder() -> TransferConfigBuilder {
        TransferConfigBuilder::new()
    }

    /// Defaults sized for mobile-class devices
    pub fn for_mobile() -> Self {
        Self {
            max_in_memory_bytes: MOBILE_MEMORY_BUDGET,
            ..Self::default()
        }
    }

    /// Defaults sized for constrained wearable-class devices
    pub fn for_constrained_device() -> Self {
        Self {
            max_in_memory_bytes: CONSTRAINED_MEMORY_BUDGET,
            target_part_size_bytes: 5 * MEBI_BYTE,
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> TransferResult<()> {
        if self.target_part_size_bytes == 0 {
            return Err(TransferError::InvalidConfiguration(
                "target_part_size_bytes must be greater than zero".to_string(),
            ));
        }

        if self.multipart_upload_threshold_bytes == 0 {
            return Err(TransferError::InvalidConfiguration(
                "multipart_upload_threshold_bytes must be greater than zero".to_string(),
            ));
        }

        if self.concurrent_task_limit_per_bucket == 0 {
            return Err(TransferError::InvalidConfiguration(
                "concurrent_task_limit_per_bucket must be at least 1".to_string(),
            ));
        }

        if self.max_in_memory_bytes == 0 {
            return Err(TransferError::InvalidConfiguration(
                "max_in_memory_bytes must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`TransferConfig`]
#[derive(Debug, Clone, Default)]
pub struct TransferConfigBuilder {
    config: TransferConfig,
}

impl TransferConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the part size floor for uploads and segment size for downloads
    pub fn target_part_size_bytes(mut self, bytes: u64) -> Self {
        self.config.target_part_size_bytes = bytes;
        self
    }

    /// Set the single-PUT threshold
    pub fn multipart_upload_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.multipart_upload_threshold_bytes = bytes;
        self
    }

    /// Set the download split strategy
    pub fn multipart_download_type(mut self, ty: MultipartDownloadType) -> Self {
        self.config.multipart_download_type = ty;
        self
    }

    /// Set when checksums are attached to upload requests
    pub fn request_checksum_calculation(mut self, mode: ChecksumMode) -> Self {
        self.config.request_checksum_calculation = mode;
        self
    }

    /// Set when download responses are checksum-validated
    pub fn response_checksum_validation(mut self, mode: ChecksumMode) -> Self {
        self.config.response_checksum_validation = mode;
        self
    }

    /// Set the global in-memory byte budget
    pub fn max_in_memory_bytes(mut self, bytes: u64) -> Self {
        self.config.max_in_memory_bytes = bytes;
        self
    }

    /// Set the per-bucket concurrent call limit
    pub fn concurrent_task_limit_per_bucket(mut self, limit: usize) -> Self {
        self.config.concurrent_task_limit_per_bucket = limit;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> TransferResult<TransferConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.target_part_size_bytes, 8 * MEBI_BYTE);
        assert_eq!(config.multipart_upload_threshold_bytes, 16 * MEBI_BYTE);
        assert_eq!(config.multipart_download_type, MultipartDownloadType::ByPart);
        assert_eq!(config.max_in_memory_bytes, 6 * GIBI_BYTE);
        assert_eq!(config.concurrent_task_limit_per_bucket, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_device_class_budgets() {
        assert_eq!(TransferConfig::for_mobile().max_in_memory_bytes, GIBI_BYTE);
        assert_eq!(
            TransferConfig::for_constrained_device().max_in_memory_bytes,
            100 * MEBI_BYTE
        );
    }

    #[test]
    fn test_validation_rejects_zero_limits() {
        assert!(TransferConfig::builder()
            .target_part_size_bytes(0)
            .build()
            .is_err());
        assert!(TransferConfig::builder()
            .concurrent_task_limit_per_bucket(0)
            .build()
            .is_err());
        assert!(TransferConfig::builder()
            .max_in_memory_bytes(0)
            .build()
            .is_err());
    }
}
