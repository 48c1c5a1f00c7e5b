//! Upload body sources
//!
//! A body is either a buffer already in memory or a seekable file of known
//! length. Parts are read as `[offset, offset + size)` slices; concurrent
//! part tasks contend on the file reader but not on the network.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::sync::Mutex;

use crate::error::{TransferError, TransferResult};

/// Source of bytes for an upload
#[derive(Debug, Clone)]
pub enum BodySource {
    /// A body already resident in memory; slicing is O(1)
    InMemory(Bytes),
    /// A seekable file; reads are serialized through one handle
    File(SeekableFile),
}

/// A file-backed body. The handle is shared by all part tasks and locked for
/// the duration of each seek+read pair.
#[derive(Debug, Clone)]
pub struct SeekableFile {
    file: Arc<Mutex<File>>,
    len: Option<u64>,
}

impl BodySource {
    /// Wrap an in-memory buffer
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        BodySource::InMemory(bytes.into())
    }

    /// Open a file and resolve its length
    pub async fn from_path(path: impl AsRef<Path>) -> TransferResult<Self> {
        let file = File::open(path.as_ref()).await?;
        let metadata = file.metadata().await?;
        let len = metadata.is_file().then(|| metadata.len());
        Ok(BodySource::File(SeekableFile {
            file: Arc::new(Mutex::new(file)),
            len,
        }))
    }

    /// Wrap an already-open file handle. The length stays unresolved when the
    /// handle is not a regular file, which fails the upload up front.
    pub async fn from_file(file: File) -> TransferResult<Self> {
        let len = match file.metadata().await {
            Ok(metadata) if metadata.is_file() => Some(metadata.len()),
            _ => None,
        };
        Ok(BodySource::File(SeekableFile {
            file: Arc::new(Mutex::new(file)),
            len,
        }))
    }

    /// Payload length, when known
    pub fn len(&self) -> Option<u64> {
        match self {
            BodySource::InMemory(bytes) => Some(bytes.len() as u64),
            BodySource::File(f) => f.len,
        }
    }

    /// True for a zero-length body
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Read exactly `size` bytes starting at `offset`
    ///
    /// Premature EOF is a fatal durability error: the plan derived the size
    /// from the resolved payload length, so a short read means the body
    /// changed underneath the transfer.
    pub async fn read_part(&self, offset: u64, size: u64) -> TransferResult<Bytes> {
        match self {
            BodySource::InMemory(bytes) => {
                let end = offset.saturating_add(size);
                if end > bytes.len() as u64 {
                    let available = (bytes.len() as u64).saturating_sub(offset);
                    return Err(TransferError::PartShortRead {
                        expected: size,
                        actual: available.min(size),
                    });
                }
                Ok(bytes.slice(offset as usize..end as usize))
            }
            BodySource::File(f) => {
                let mut file = f.file.lock().await;
                file.seek(SeekFrom::Start(offset)).await?;

                let mut buf = vec![0u8; size as usize];
                let mut filled = 0usize;
                while filled < buf.len() {
                    let n = file.read(&mut buf[filled..]).await?;
                    if n == 0 {
                        return Err(TransferError::PartShortRead {
                            expected: size,
                            actual: filled as u64,
                        });
                    }
                    filled += n;
                }

                Ok(Bytes::from(buf))
            }
        }
    }
}

impl From<Bytes> for BodySource {
    fn from(value: Bytes) -> Self {
        BodySource::InMemory(value)
    }
}

impl From<Vec<u8>> for BodySource {
    fn from(value: Vec<u8>) -> Self {
        BodySource::InMemory(Bytes::from(value))
    }
}

impl From<&'static [u8]> for BodySource {
    fn from(value: &'static [u8]) -> Self {
        BodySource::InMemory(Bytes::from_static(value))
    }
}
