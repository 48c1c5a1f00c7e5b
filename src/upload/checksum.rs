//! Checksum discipline for uploads

use serde::{Deserialize, Serialize};

/// Checksum algorithms the object store can compute per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChecksumAlgorithm {
    /// CRC-32
    Crc32,
    /// CRC-32C (Castagnoli)
    Crc32C,
    /// CRC-64/NVME
    Crc64Nvme,
    /// SHA-1
    Sha1,
    /// SHA-256
    Sha256,
}

impl ChecksumAlgorithm {
    /// Fixed preference order when the caller does not pick an algorithm
    pub const PRIORITY: [ChecksumAlgorithm; 5] = [
        ChecksumAlgorithm::Crc32C,
        ChecksumAlgorithm::Crc32,
        ChecksumAlgorithm::Crc64Nvme,
        ChecksumAlgorithm::Sha1,
        ChecksumAlgorithm::Sha256,
    ];

    /// Algorithm used when nothing is requested and no preference applies
    pub const DEFAULT: ChecksumAlgorithm = ChecksumAlgorithm::Crc32;

    /// Pick the highest-priority algorithm out of the set a client
    /// advertises, falling back to the default when none match.
    pub fn preferred(offered: &[ChecksumAlgorithm]) -> ChecksumAlgorithm {
        Self::PRIORITY
            .iter()
            .copied()
            .find(|algorithm| offered.contains(algorithm))
            .unwrap_or(Self::DEFAULT)
    }
}

/// Whether a multipart upload carries one whole-object checksum or a
/// composite of per-part checksums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChecksumType {
    /// Caller supplied a checksum of the complete object
    FullObject,
    /// The store derives a composite checksum from the parts
    #[default]
    Composite,
}

impl ChecksumType {
    /// FullObject when the caller supplied a whole-object checksum value
    pub(crate) fn for_upload(full_object_checksum: Option<&str>) -> ChecksumType {
        if full_object_checksum.is_some() {
            ChecksumType::FullObject
        } else {
            ChecksumType::Composite
        }
    }
}
