//! `Range` and `Content-Range` header handling
//!
//! S3 supports a single byte range per request. The engine additionally
//! rejects suffix ranges (`bytes=-n`) because every code path knows its
//! start offset.

use core::fmt;
use std::str::FromStr;

use crate::error::TransferError;

/// A single byte range as carried in a `Range` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ByteRange {
    /// All bytes between start and end inclusive (`bytes=x-y`)
    Inclusive(u64, u64),
    /// All bytes from start to the end of the object (`bytes=x-`)
    AllFrom(u64),
}

/// Representation of a `Range` header value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Range(pub(crate) ByteRange);

impl Range {
    pub(crate) fn bytes_inclusive(start: u64, end: u64) -> Self {
        Range(ByteRange::Inclusive(start, end))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ByteRange::Inclusive(start, end) => write!(f, "bytes={}-{}", start, end),
            ByteRange::AllFrom(start) => write!(f, "bytes={}-", start),
        }
    }
}

impl From<Range> for String {
    fn from(value: Range) -> Self {
        value.to_string()
    }
}

impl FromStr for Range {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut iter = s.splitn(2, '=');
        match (iter.next(), iter.next()) {
            (Some("bytes"), Some(spec)) => {
                if spec.contains(',') {
                    return Err(invalid_range(format!(
                        "multiple byte ranges are not supported: {}",
                        s
                    )));
                }
                ByteRange::from_str(spec)
                    .map(Range)
                    .map_err(|_| invalid_range(format!("invalid range header: {}", s)))
            }
            _ => Err(invalid_range(format!(
                "range header must start with \"bytes=\": {}",
                s
            ))),
        }
    }
}

impl FromStr for ByteRange {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut iter = s.splitn(2, '-');
        match (iter.next(), iter.next()) {
            // suffix range "-n": unsupported
            (Some(""), Some(_)) => Err(()),
            (Some(start), Some("")) => start.parse().map(ByteRange::AllFrom).or(Err(())),
            (Some(start), Some(end)) => match (start.parse(), end.parse()) {
                (Ok(start), Ok(end)) if start <= end => Ok(ByteRange::Inclusive(start, end)),
                _ => Err(()),
            },
            _ => Err(()),
        }
    }
}

fn invalid_range(message: String) -> TransferError {
    TransferError::InvalidRangeFormat(message)
}

/// Parsed `Content-Range: bytes X-Y/Z` header. `Z` is the authoritative
/// object size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContentRange {
    pub(crate) start: u64,
    pub(crate) end: u64,
    pub(crate) total: u64,
}

impl FromStr for ContentRange {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("bytes ")
            .ok_or_else(|| invalid_range(format!("invalid content-range header: {}", s)))?;

        let (span, total) = rest
            .split_once('/')
            .ok_or_else(|| invalid_range(format!("invalid content-range header: {}", s)))?;

        let total: u64 = total
            .parse()
            .map_err(|_| TransferError::FailedToDetermineObjectSize)?;

        let (start, end) = span
            .split_once('-')
            .ok_or_else(|| invalid_range(format!("invalid content-range header: {}", s)))?;

        let start: u64 = start
            .parse()
            .map_err(|_| invalid_range(format!("invalid content-range header: {}", s)))?;
        let end: u64 = end
            .parse()
            .map_err(|_| invalid_range(format!("invalid content-range header: {}", s)))?;

        Ok(ContentRange { start, end, total })
    }
}
