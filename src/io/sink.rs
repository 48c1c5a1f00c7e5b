//! Download byte sinks
//!
//! A sink receives the object's bytes in file order. Writes loop until each
//! chunk is fully consumed; a zero-length write is treated as transient and
//! retried after a short jittered backoff, while an I/O error is fatal for
//! the whole operation.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use rand::Rng;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{TransferError, TransferResult};

/// Destination of bytes for a download
pub enum ByteSink {
    /// Write to a file
    File(File),
    /// Accumulate in memory; retrieved from the operation result
    Memory(BytesMut),
    /// Write to a caller-supplied writer
    Writer(Box<dyn AsyncWrite + Send + Unpin>),
}

impl std::fmt::Debug for ByteSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteSink::File(_) => f.write_str("ByteSink::File"),
            ByteSink::Memory(buf) => write!(f, "ByteSink::Memory({} bytes)", buf.len()),
            ByteSink::Writer(_) => f.write_str("ByteSink::Writer"),
        }
    }
}

impl ByteSink {
    /// An empty in-memory sink
    pub fn memory() -> Self {
        ByteSink::Memory(BytesMut::new())
    }

    /// A sink over an open file
    pub fn file(file: File) -> Self {
        ByteSink::File(file)
    }

    /// A sink over a caller-supplied writer
    pub fn writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        ByteSink::Writer(Box::new(writer))
    }

    /// Write one chunk completely, tolerating short writes
    pub(crate) async fn write_chunk(&mut self, chunk: Bytes) -> TransferResult<()> {
        match self {
            ByteSink::Memory(buf) => {
                buf.extend_from_slice(&chunk);
                Ok(())
            }
            ByteSink::File(file) => write_all_chunk(file, &chunk).await,
            ByteSink::Writer(writer) => write_all_chunk(writer, &chunk).await,
        }
    }

    /// Flush any buffered writes
    pub(crate) async fn flush(&mut self) -> TransferResult<()> {
        match self {
            ByteSink::Memory(_) => Ok(()),
            ByteSink::File(file) => file
                .flush()
                .await
                .map_err(|e| TransferError::FailedToWriteSink(e.to_string())),
            ByteSink::Writer(writer) => writer
                .flush()
                .await
                .map_err(|e| TransferError::FailedToWriteSink(e.to_string())),
        }
    }

    /// Consume the sink, returning the accumulated bytes for memory sinks
    pub(crate) fn into_bytes(self) -> Option<Bytes> {
        match self {
            ByteSink::Memory(buf) => Some(buf.freeze()),
            _ => None,
        }
    }
}

async fn write_all_chunk<W>(writer: &mut W, chunk: &[u8]) -> TransferResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut remaining = chunk;
    while !remaining.is_empty() {
        let n = writer
            .write(remaining)
            .await
            .map_err(|e| TransferError::FailedToWriteSink(e.to_string()))?;
        if n == 0 {
            // Transient: back off 1-10 ms and retry the remainder.
            let jitter = rand::thread_rng().gen_range(1..=10);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
            continue;
        }
        remaining = &remaining[n..];
    }
    Ok(())
}

impl From<File> for ByteSink {
    fn from(value: File) -> Self {
        ByteSink::File(value)
    }
}
